use crate::dag;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wfcore::{FlowError, Workflow};

/// Definition file names probed in each template directory, in order
const DEFINITION_FILES: [&str; 3] = ["template.yaml", "template.yml", "template.json"];

/// Named workflow templates loaded from a directory tree.
///
/// Layout: `<base_path>/<template-dir>/template.yaml`. Templates are keyed by
/// the `name` inside the definition, not by the directory name.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Arc<Workflow>>,
    base_path: PathBuf,
}

impl TemplateRegistry {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            templates: HashMap::new(),
            base_path: base_path.into(),
        }
    }

    /// Load every template under the base path.
    ///
    /// Entries without a readable, valid definition are skipped. Only a base
    /// path that cannot be listed is an error. Returns the number loaded.
    pub fn load_templates(&mut self) -> Result<usize, FlowError> {
        let entries = fs::read_dir(&self.base_path)?;
        let mut loaded = 0;

        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    tracing::warn!("Skipping unreadable template entry: {}", e);
                    continue;
                }
            };
            if !path.is_dir() {
                continue;
            }

            match load_definition(&path) {
                Ok(Some(workflow)) => {
                    tracing::info!("Loaded template {} from {}", workflow.name, path.display());
                    self.add_template(workflow);
                    loaded += 1;
                }
                Ok(None) => {
                    tracing::debug!("No template definition in {}", path.display());
                }
                Err(e) => {
                    tracing::warn!("Skipping template {}: {}", path.display(), e);
                }
            }
        }

        Ok(loaded)
    }

    pub fn get_template(&self, name: &str) -> Option<Arc<Workflow>> {
        self.templates.get(name).cloned()
    }

    /// Template names, sorted
    pub fn list_templates(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.keys().cloned().collect();
        names.sort();
        names
    }

    /// Insert or overwrite a template under its workflow name
    pub fn add_template(&mut self, workflow: Workflow) {
        self.templates
            .insert(workflow.name.clone(), Arc::new(workflow));
    }

    pub fn templates(&self) -> impl Iterator<Item = &Arc<Workflow>> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

/// `Ok(None)` when the directory holds no definition file.
fn load_definition(dir: &Path) -> Result<Option<Workflow>, FlowError> {
    let Some(path) = DEFINITION_FILES
        .iter()
        .map(|file| dir.join(file))
        .find(|path| path.is_file())
    else {
        return Ok(None);
    };

    let source = fs::read_to_string(&path)?;
    let workflow = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Workflow::from_json(&source)?,
        _ => Workflow::from_yaml(&source)?,
    };
    dag::validate_workflow(&workflow)?;
    Ok(Some(workflow))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wfcore::Step;

    #[test]
    fn add_template_overwrites_by_name() {
        let mut registry = TemplateRegistry::new("unused");
        registry.add_template(Workflow::new("review").with_step(Step::new("a", "agent")));
        registry.add_template(Workflow::new("review"));
        registry.add_template(Workflow::new("audit"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list_templates(), vec!["audit", "review"]);
        assert!(registry.get_template("review").unwrap().steps.is_empty());
        assert!(registry.get_template("missing").is_none());
    }
}
