use serde::Serialize;

/// Shape of a single field in a stage's required output.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    TextList,
    Number { min: f64, max: f64 },
    Choice { options: &'static [&'static str] },
    OptionalChoice { options: &'static [&'static str] },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// Output shape handed to the judgment capability alongside the prompt.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SchemaDescriptor {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl SchemaDescriptor {
    pub fn new(name: &'static str, fields: Vec<FieldSpec>) -> Self {
        Self { name, fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// JSON template shown to the judgment capability, one placeholder per field.
    pub fn render_template(&self) -> String {
        let placeholders: Vec<String> = self
            .fields
            .iter()
            .map(|field| {
                let hint = match &field.kind {
                    FieldKind::Text => "\"<text>\"".to_string(),
                    FieldKind::TextList => "[\"<text>\", ...]".to_string(),
                    FieldKind::Number { min, max } => format!("<number {min} to {max}>"),
                    FieldKind::Choice { options } => quoted(options).join(" | "),
                    FieldKind::OptionalChoice { options } => {
                        let mut choices = quoted(options);
                        choices.push("null".to_string());
                        choices.join(" | ")
                    }
                };
                format!("  \"{}\": {}", field.name, hint)
            })
            .collect();
        format!("{{\n{}\n}}", placeholders.join(",\n"))
    }
}

fn quoted(options: &[&str]) -> Vec<String> {
    options.iter().map(|o| format!("\"{o}\"")).collect()
}
