use std::collections::HashMap;

use crate::codebook::polarity::is_negative_label;
use crate::codebook::{Codebook, Section};
use crate::core::errors::{AppError, AppResult};
use crate::core::types::{AnalysisResult, VariableResult};

const NEWS_DEFAULT_EDGES: &[(&str, &[&str])] = &[
    ("nombre_propio_titular", &["genero_nombre_propio_titular"]),
    ("personas_mencionadas", &["genero_personas_mencionadas"]),
    ("declaracion_fuente", &["nombre_fuente"]),
    ("nombre_fuente", &["genero_fuente", "tipo_fuente"]),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyMap {
    edges: Vec<(String, Vec<String>)>,
}

impl DependencyMap {
    /// Fails with `DependencyCycle` when any chain of edges returns to its start.
    pub fn new(edges: Vec<(String, Vec<String>)>) -> AppResult<Self> {
        let mut merged: Vec<(String, Vec<String>)> = vec![];
        for (parent, children) in edges {
            let parent = parent.trim().to_string();
            let children = children
                .into_iter()
                .map(|child| child.trim().to_string())
                .filter(|child| !child.is_empty());
            match merged.iter_mut().find(|(existing, _)| *existing == parent) {
                Some((_, existing)) => {
                    for child in children {
                        if !existing.contains(&child) {
                            existing.push(child);
                        }
                    }
                }
                None => {
                    let mut unique: Vec<String> = vec![];
                    for child in children {
                        if !unique.contains(&child) {
                            unique.push(child);
                        }
                    }
                    merged.push((parent, unique));
                }
            }
        }
        let map = Self { edges: merged };
        map.check_acyclic()?;
        Ok(map)
    }

    pub fn news_default() -> Self {
        Self {
            edges: NEWS_DEFAULT_EDGES
                .iter()
                .map(|(parent, children)| {
                    (
                        parent.to_string(),
                        children.iter().map(ToString::to_string).collect(),
                    )
                })
                .collect(),
        }
    }

    /// Edges declared by the codebook source, else the news default table.
    pub fn from_codebook_or_default(codebook: &Codebook) -> AppResult<Self> {
        match codebook.declared_dependencies() {
            Some(edges) => Self::new(edges.to_vec()),
            None => Ok(Self::news_default()),
        }
    }

    pub fn edges(&self) -> &[(String, Vec<String>)] {
        &self.edges
    }

    pub fn children(&self, parent: &str) -> &[String] {
        self.edges
            .iter()
            .find(|(existing, _)| existing == parent)
            .map(|(_, children)| children.as_slice())
            .unwrap_or(&[])
    }

    fn check_acyclic(&self) -> AppResult<()> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            node: &'a str,
            graph: &HashMap<&'a str, &'a [String]>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> AppResult<()> {
            match marks.get(node) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(AppError::DependencyCycle(node.to_string())),
                None => {}
            }
            marks.insert(node, Mark::Visiting);
            for child in graph.get(node).copied().unwrap_or(&[]) {
                visit(child.as_str(), graph, marks)?;
            }
            marks.insert(node, Mark::Done);
            Ok(())
        }

        let graph: HashMap<&str, &[String]> = self
            .edges
            .iter()
            .map(|(parent, children)| (parent.as_str(), children.as_slice()))
            .collect();
        let mut marks = HashMap::new();
        for (parent, _) in &self.edges {
            visit(parent.as_str(), &graph, &mut marks)?;
        }
        Ok(())
    }

    /// Forces children of negative parents to their negative code, repeating full
    /// passes until one changes nothing. Returns the number of variables rewritten.
    pub fn resolve(&self, section: &Section, result: &mut AnalysisResult) -> usize {
        let mut rewritten = 0;
        // An acyclic map settles in at most one pass per edge, plus a clean pass.
        for _ in 0..=self.edges.len() {
            let mut changed = false;
            for (parent, children) in &self.edges {
                let parent_negative = result
                    .get(parent)
                    .map(|value| is_negative_label(&value.label))
                    .unwrap_or(false);
                if !parent_negative {
                    continue;
                }
                for child in children {
                    let Some(current) = result.variables.get_mut(child) else {
                        continue;
                    };
                    let map = section.lookup(child);
                    let negative = map.negative_code();
                    let forced = VariableResult {
                        code: negative.to_string(),
                        label: map.label(negative).unwrap_or_default().to_string(),
                        evidence: vec![],
                    };
                    if *current != forced {
                        tracing::debug!(%parent, %child, from = %current.code, to = %forced.code, "child forced negative");
                        *current = forced;
                        changed = true;
                        rewritten += 1;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        rewritten
    }
}
