use std::sync::Arc;

use newscode_lib::{
    codebook::{parse_ini_codebook, Codebook},
    config::EngineConfig,
    core::types::{AnalysisResult, IssueKind, SourceDocument},
    engine::{audit::audit_result, extract_json_object, DependencyMap, ResultAssembler},
};

const CODEBOOK: &str = r#"
[CONTENIDO_GENERAL]
variables = ['nombre_propio_titular', 'genero_nombre_propio_titular', 'cita_titular', 'menciona_ia', 'tema']
free_text = ['nombre_propio_titular']
NOMBRE_PROPIO_TITULAR = {'1': 'No aplica'}
GENERO_NOMBRE_PROPIO_TITULAR = {'1': 'No hay', '2': 'Sí, hombre', '3': 'Sí, mujer', '4': 'Sí, mujer y hombre'}
CITA_TITULAR = {'1': 'No', '2': 'Sí, directa', '3': 'Sí, indirecta'}
MENCIONA_IA = {'1': 'No', '2': 'Sí'}
TEMA = {'1': 'Científica', '2': 'Política', '3': 'Deportiva', '4': 'Economía',
    '5': 'Cultura', '6': 'Sociedad', '7': 'Otros'}
"#;

const SECTION: &str = "CONTENIDO_GENERAL";

fn codebook() -> Codebook {
    let (codebook, issues) = parse_ini_codebook(CODEBOOK);
    assert!(issues.is_empty(), "{issues:?}");
    codebook
}

fn assembler() -> ResultAssembler {
    let codebook = codebook();
    let dependencies = DependencyMap::from_codebook_or_default(&codebook).expect("deps");
    ResultAssembler::new(Arc::new(codebook), Arc::new(dependencies), EngineConfig::default())
}

fn document() -> SourceDocument {
    SourceDocument::new(
        "Ana gana el premio",
        "Ana, investigadora, declaró: \"Estoy feliz\"",
    )
}

fn analyze(raw: &str) -> AnalysisResult {
    assembler()
        .analyze(SECTION, Some(raw), &document())
        .expect("known section")
}

fn assert_coherent(result: &AnalysisResult) {
    let assembler = assembler();
    let section = assembler.codebook().section(SECTION).expect("section");
    let report = audit_result(section, assembler.dependencies(), &document(), result);
    assert!(report.is_coherent(), "{:?}", report.violations);
}

#[test]
fn clean_input_is_kept_as_given() {
    let result = analyze(
        r#"{"nombre_propio_titular": {"codigo":"Ana","evidencia":["Ana"]},
            "genero_nombre_propio_titular": {"codigo":"3","evidencia":[]}}"#,
    );

    let name = result.get("nombre_propio_titular").expect("name");
    assert_eq!(name.code, "Ana");
    assert_eq!(name.label, "Ana");
    assert_eq!(name.evidence, vec!["Ana".to_string()]);

    let gender = result.get("genero_nombre_propio_titular").expect("gender");
    assert_eq!(gender.code, "3");
    assert_eq!(gender.label, "Sí, mujer");
    assert!(gender.evidence.is_empty());

    assert!(!result.has_issue(IssueKind::InvalidCode));
    assert_coherent(&result);
}

#[test]
fn negative_parent_overrides_child() {
    let result = analyze(
        r#"{"nombre_propio_titular": {"codigo":"No aplica","evidencia":[]},
            "genero_nombre_propio_titular": {"codigo":"3","evidencia":["Ana"]}}"#,
    );
    assert_eq!(result.code_of("nombre_propio_titular"), Some("1"));
    let gender = result.get("genero_nombre_propio_titular").expect("gender");
    assert_eq!(gender.code, "1");
    assert_eq!(gender.label, "No hay");
    assert!(gender.evidence.is_empty());
    assert_coherent(&result);
}

#[test]
fn hallucinated_headline_evidence_is_dropped() {
    let result = analyze(
        r#"{"cita_titular": {"codigo":"2","evidencia":["Pedro dijo algo", "premio"]}}"#,
    );
    let quote = result.get("cita_titular").expect("cita");
    assert_eq!(quote.code, "2");
    assert_eq!(quote.evidence, vec!["premio".to_string()]);

    let body_only = analyze(r#"{"cita_titular": {"codigo":"2","evidencia":["Estoy feliz"]}}"#);
    assert!(
        body_only.get("cita_titular").expect("cita").evidence.is_empty(),
        "headline variables cannot cite the body"
    );
}

#[test]
fn out_of_range_code_resolves_to_negative() {
    let result = analyze(r#"{"menciona_ia": {"codigo":"9","evidencia":["investigadora"]}}"#);
    let value = result.get("menciona_ia").expect("menciona_ia");
    assert_eq!(value.code, "1");
    assert_eq!(value.label, "No");
    assert!(value.evidence.is_empty());
    assert!(result
        .errors
        .iter()
        .any(|issue| issue.kind == IssueKind::InvalidCode
            && issue.variable.as_deref() == Some("menciona_ia")));
}

#[test]
fn every_code_belongs_to_its_map_even_for_garbage_answers() {
    let answers = [
        r#"{"tema": "¿Política?", "cita_titular": 7, "menciona_ia": {"codigo": true}}"#,
        r#"```json
{"respuesta": {"tema": {"code": "02", "evidence": "declaró"}, "genero_nombre_propio_titular": "Mujer"}}
```"#,
        "Lo siento, no puedo analizar este texto.",
        r#"{"tema": {"codigo": "La noticia habla de un premio científico", "evidencia": ["premio"]}}"#,
    ];
    let codebook = codebook();
    let section = codebook.section(SECTION).expect("section");
    for raw in answers {
        let result = analyze(raw);
        assert_eq!(result.variables.len(), section.variables().len());
        for variable in section.variables() {
            let value = result.get(variable).expect("declared variable present");
            if section.is_free_text(variable) && value.code == value.label {
                continue;
            }
            assert!(
                section.lookup(variable).contains(&value.code),
                "{variable} -> {} for {raw}",
                value.code
            );
        }
        assert_coherent(&result);
    }
}

#[test]
fn wrapped_fenced_answer_is_unwrapped() {
    let result = analyze(
        "Claro:\n```json\n{\"respuesta\": {\"tema\": {\"code\": \"02\", \"evidence\": \"declaró\"}}}\n```",
    );
    let tema = result.get("tema").expect("tema");
    assert_eq!(tema.code, "2");
    assert_eq!(tema.evidence, vec!["declaró".to_string()]);
    assert!(!result.has_issue(IssueKind::UnexpectedKey));
}

#[test]
fn dependency_resolution_is_idempotent() {
    let assembler = assembler();
    let section = assembler.codebook().section(SECTION).expect("section");
    let mut result = analyze(
        r#"{"nombre_propio_titular": "Ninguno", "genero_nombre_propio_titular": "2"}"#,
    );
    let once = result.clone();
    assert_eq!(assembler.dependencies().resolve(section, &mut result), 0);
    assert_eq!(result, once);
}

#[test]
fn extraction_examples() {
    let inner = extract_json_object(
        "Here you go: ```json\n{\"a\": {\"codigo\":\"1\",\"evidencia\":[]}}\n```",
    )
    .expect("object");
    assert_eq!(inner["a"]["codigo"], "1");
    assert!(extract_json_object("no json here").is_none());
}
