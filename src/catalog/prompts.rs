//! Prompt templates with `{placeholder}` substitution.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use super::CatalogError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// A named template. `template` may reference arguments as `{name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub name: String,
    pub template: String,
    pub arguments: Vec<PromptArgument>,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            arguments: Vec::new(),
        }
    }

    pub fn required(self, name: &str, description: &str) -> Self {
        self.argument(name, description, true)
    }

    pub fn optional(self, name: &str, description: &str) -> Self {
        self.argument(name, description, false)
    }

    fn argument(mut self, name: &str, description: &str, required: bool) -> Self {
        self.arguments.push(PromptArgument {
            name: name.to_string(),
            description: description.to_string(),
            required,
        });
        self
    }

    pub fn to_listing(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.template,
            "arguments": self.arguments,
        })
    }

    /// Substitute `arguments` into the template.
    ///
    /// Provided arguments the template does not reference are appended as
    /// `name: value` lines so optional context is not silently lost.
    pub fn render(&self, arguments: &Map<String, Value>) -> Result<RenderedPrompt, CatalogError> {
        if let Some(missing) = self
            .arguments
            .iter()
            .find(|a| a.required && !has_value(arguments, &a.name))
        {
            return Err(CatalogError::MissingArgument {
                prompt: self.name.clone(),
                argument: missing.name.clone(),
            });
        }

        let (description, referenced) = self.substitute(arguments);
        let extras: Vec<String> = self
            .arguments
            .iter()
            .filter(|arg| !referenced.contains(&arg.name.as_str()))
            .filter_map(|arg| {
                let value = arguments.get(&arg.name).filter(|v| !v.is_null())?;
                Some(format!("{}: {}", arg.name, value_text(value)))
            })
            .collect();

        let mut content = description.clone();
        if !extras.is_empty() {
            content.push_str("\n\n");
            content.push_str(&extras.join("\n"));
        }

        Ok(RenderedPrompt {
            description,
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content,
            }],
        })
    }
}

impl PromptTemplate {
    /// Single left-to-right pass over the template. Substituted text is
    /// never scanned again, so values containing `{name}` stay literal.
    /// Placeholders without a declared, provided argument are kept as is.
    fn substitute(&self, arguments: &Map<String, Value>) -> (String, Vec<&str>) {
        let mut out = String::with_capacity(self.template.len());
        let mut referenced = Vec::new();
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                out.push_str(&rest[open..]);
                rest = "";
                break;
            };
            let name = &after[..close];
            let declared = self.arguments.iter().find(|a| a.name == name);
            match declared.and_then(|a| arguments.get(&a.name).filter(|v| !v.is_null()).map(|v| (a, v))) {
                Some((arg, value)) => {
                    out.push_str(&value_text(value));
                    referenced.push(arg.name.as_str());
                    rest = &after[close + 1..];
                }
                None => {
                    // Not a known placeholder; emit the brace and keep scanning.
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        (out, referenced)
    }
}

fn has_value(arguments: &Map<String, Value>, name: &str) -> bool {
    arguments.get(name).is_some_and(|v| !v.is_null())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPrompt {
    pub description: String,
    pub messages: Vec<PromptMessage>,
}

/// Ordered, name-keyed prompt registry.
#[derive(Debug, Default)]
pub struct PromptCatalog {
    prompts: Vec<PromptTemplate>,
    index: HashMap<String, usize>,
}

impl PromptCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalogue with the built-in analysis templates.
    pub fn with_builtin() -> Self {
        let mut catalog = Self::new();
        for prompt in builtin_prompts() {
            if let Err(e) = catalog.register(prompt) {
                tracing::warn!("Skipping prompt: {}", e);
            }
        }
        catalog
    }

    pub fn register(&mut self, prompt: PromptTemplate) -> Result<(), CatalogError> {
        if self.index.contains_key(&prompt.name) {
            return Err(CatalogError::DuplicatePrompt(prompt.name));
        }
        self.index.insert(prompt.name.clone(), self.prompts.len());
        self.prompts.push(prompt);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&PromptTemplate, CatalogError> {
        self.index
            .get(name)
            .map(|&i| &self.prompts[i])
            .ok_or_else(|| CatalogError::UnknownPrompt(name.to_string()))
    }

    pub fn render(&self, name: &str, arguments: &Map<String, Value>) -> Result<RenderedPrompt, CatalogError> {
        self.lookup(name)?.render(arguments)
    }

    pub fn list(&self) -> impl Iterator<Item = &PromptTemplate> + Clone + '_ {
        self.prompts.iter()
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}

fn builtin_prompts() -> Vec<PromptTemplate> {
    vec![
        PromptTemplate::new(
            "analyze_data",
            "Analyze data and provide insights on {data_type} with focus on {analysis_focus}",
        )
        .required("data_type", "Type of data to analyze (e.g., CSV, JSON, numerical)")
        .required("analysis_focus", "Focus area for analysis (e.g., trends, anomalies, patterns)")
        .optional("context", "Additional context about the data"),
        PromptTemplate::new(
            "code_review",
            "Review {language} code for {review_type} and provide suggestions",
        )
        .required("language", "Programming language (e.g., Python, JavaScript, Rust)")
        .required("review_type", "Type of review (e.g., security, performance, style)")
        .optional("complexity_level", "Code complexity level (beginner, intermediate, advanced)"),
        PromptTemplate::new(
            "system_troubleshooting",
            "Troubleshoot {system_type} issues with {error_symptoms}",
        )
        .required("system_type", "Type of system (e.g., web server, database, network)")
        .required("error_symptoms", "Observed error symptoms or issues")
        .optional("urgency", "Urgency level (low, medium, high, critical)"),
        PromptTemplate::new(
            "documentation_generator",
            "Generate {doc_type} documentation for {subject}",
        )
        .required("doc_type", "Type of documentation (API, user guide, technical specs)")
        .required("subject", "Subject to document (function, module, system)")
        .optional("audience", "Target audience (developers, users, administrators)")
        .optional("format", "Output format (markdown, HTML, plain text)"),
        PromptTemplate::new(
            "performance_analysis",
            "Analyze performance metrics for {system_component} and identify optimization opportunities",
        )
        .required("system_component", "System component to analyze (API, database, frontend)")
        .required("metrics_data", "Performance metrics data or description")
        .optional("baseline_period", "Baseline period for comparison"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_builtin_catalog_order() {
        let catalog = PromptCatalog::with_builtin();
        let names: Vec<&str> = catalog.list().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "analyze_data",
                "code_review",
                "system_troubleshooting",
                "documentation_generator",
                "performance_analysis",
            ]
        );
    }

    #[test]
    fn test_render_substitutes_and_appends_extras() {
        let catalog = PromptCatalog::with_builtin();
        let rendered = catalog
            .render(
                "analyze_data",
                &args(json!({"data_type": "CSV", "analysis_focus": "trends", "context": "Q3 sales"})),
            )
            .unwrap();

        assert_eq!(rendered.description, "Analyze data and provide insights on CSV with focus on trends");
        assert_eq!(rendered.messages.len(), 1);
        assert_eq!(rendered.messages[0].role, "user");
        assert_eq!(
            rendered.messages[0].content,
            "Analyze data and provide insights on CSV with focus on trends\n\ncontext: Q3 sales"
        );
    }

    #[test]
    fn test_missing_required_argument() {
        let catalog = PromptCatalog::with_builtin();
        let err = catalog
            .render("code_review", &args(json!({"language": "Rust", "review_type": null})))
            .unwrap_err();
        assert_eq!(
            err,
            CatalogError::MissingArgument {
                prompt: "code_review".into(),
                argument: "review_type".into()
            }
        );
    }

    #[test]
    fn test_non_string_values_render_as_json() {
        let prompt = PromptTemplate::new("t", "limit {n}").required("n", "number");
        let rendered = prompt.render(&args(json!({"n": 5}))).unwrap();
        assert_eq!(rendered.description, "limit 5");
    }

    #[test]
    fn test_values_are_not_substituted_twice() {
        let catalog = PromptCatalog::with_builtin();
        let rendered = catalog
            .render(
                "code_review",
                &args(json!({"language": "{review_type}", "review_type": "security"})),
            )
            .unwrap();
        assert_eq!(
            rendered.description,
            "Review {review_type} code for security and provide suggestions"
        );
        assert_eq!(rendered.messages[0].content, rendered.description);
    }

    #[test]
    fn test_unknown_placeholders_are_left_verbatim() {
        let prompt = PromptTemplate::new("t", "{greeting} {name}, {").required("name", "who");
        let rendered = prompt.render(&args(json!({"name": "Ada"}))).unwrap();
        assert_eq!(rendered.description, "{greeting} Ada, {");
    }

    #[test]
    fn test_duplicate_and_unknown() {
        let mut catalog = PromptCatalog::with_builtin();
        assert_eq!(
            catalog.register(PromptTemplate::new("code_review", "x")).unwrap_err(),
            CatalogError::DuplicatePrompt("code_review".into())
        );
        assert!(matches!(
            catalog.render("ghost", &Map::new()),
            Err(CatalogError::UnknownPrompt(_))
        ));
    }
}
