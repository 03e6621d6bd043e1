use crate::codebook::Section;
use crate::core::types::SourceDocument;

use super::scope::{scope_for, EvidenceScope};

fn is_gender_variable(variable: &str) -> bool {
    variable.to_ascii_lowercase().starts_with("genero")
}

/// Declared variables with gender variables moved last, so the model names
/// people before it is asked about them.
pub fn prompt_order(section: &Section) -> Vec<&str> {
    let (gender, rest): (Vec<&str>, Vec<&str>) = section
        .variables()
        .iter()
        .map(String::as_str)
        .partition(|variable| is_gender_variable(variable));
    rest.into_iter().chain(gender).collect()
}

pub fn section_prompt(section: &Section, document: &SourceDocument) -> String {
    let order = prompt_order(section);
    let mut text = String::new();
    text.push_str(&format!(
        "Analiza el siguiente texto periodístico y clasifícalo según las variables de {}.\n\n",
        section.name()
    ));

    text.push_str("VARIABLES Y CÓDIGOS PERMITIDOS:\n");
    for variable in &order {
        let map = section.lookup(variable);
        text.push_str(&format!("- {variable}:"));
        if section.is_free_text(variable) {
            text.push_str(" texto libre tomado del artículo, o");
        }
        for (code, label) in map.entries() {
            text.push_str(&format!(" '{code}' = {label};"));
        }
        text.push('\n');
    }

    let headline: Vec<&str> = order
        .iter()
        .copied()
        .filter(|variable| scope_for(section, variable) == EvidenceScope::Headline)
        .collect();
    if !headline.is_empty() {
        text.push_str(&format!(
            "\nEstas variables se responden SOLO con el titular: {}\n",
            headline.join(", ")
        ));
    }

    text.push_str("\nREGLAS:\n");
    text.push_str("1. 'codigo' debe ser exactamente una de las claves listadas, como string.\n");
    text.push_str("2. 'evidencia' es una lista de fragmentos copiados literalmente del texto.\n");
    text.push_str("3. Si la respuesta es negativa ('No', 'No hay', 'No aplica'), 'evidencia' debe ser [].\n");
    text.push_str("4. Usa exactamente los nombres de variable indicados y no añadas otras claves.\n");
    text.push_str("5. Devuelve solo el objeto JSON, sin texto adicional.\n\n");

    text.push_str("FORMATO:\n{\n");
    for (idx, variable) in order.iter().enumerate() {
        let separator = if idx + 1 == order.len() { "" } else { "," };
        text.push_str(&format!(
            "  \"{variable}\": {{\"codigo\": \"...\", \"evidencia\": []}}{separator}\n"
        ));
    }
    text.push_str("}\n\n");

    text.push_str("TITULAR:\n");
    text.push_str(&document.title);
    text.push_str("\n\nTEXTO:\n");
    text.push_str(&document.body);
    text.push('\n');
    text
}
