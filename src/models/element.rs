use serde::Serialize;

// ── Element ──────────────────────────────────────────────────

/// One structured piece of an approval's content.
///
/// `title` and `message` are informational. `boolean`, `buttons` and `form`
/// are decision controls and select the approval's [`DecisionMode`].
///
/// ```json
/// [
///   { "type": "title", "text": "Deploy to prod?" },
///   { "type": "buttons", "options": ["Ship it", "Hold"] }
/// ]
/// ```
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    Title {
        text: String,
    },
    Message {
        text: String,
    },
    Boolean,
    Buttons {
        options: Vec<String>,
    },
    Form {
        name: String,
        #[serde(rename = "fieldType")]
        field_type: FieldType,
        #[serde(skip_serializing_if = "Option::is_none")]
        options: Option<Vec<serde_json::Value>>,
    },
}

impl Element {
    /// The `type` tag as it appears on the wire.
    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Title { .. } => ElementKind::Title,
            Element::Message { .. } => ElementKind::Message,
            Element::Boolean => ElementKind::Boolean,
            Element::Buttons { .. } => ElementKind::Buttons,
            Element::Form { .. } => ElementKind::Form,
        }
    }

    /// The decision mode this element contributes, if any.
    pub fn decision_mode(&self) -> Option<DecisionMode> {
        self.kind().decision_mode()
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Title,
    Message,
    Boolean,
    Buttons,
    Form,
}

impl ElementKind {
    pub const ALL: [ElementKind; 5] = [
        ElementKind::Title,
        ElementKind::Message,
        ElementKind::Boolean,
        ElementKind::Buttons,
        ElementKind::Form,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Title => "title",
            ElementKind::Message => "message",
            ElementKind::Boolean => "boolean",
            ElementKind::Buttons => "buttons",
            ElementKind::Form => "form",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn decision_mode(&self) -> Option<DecisionMode> {
        match self {
            ElementKind::Title | ElementKind::Message => None,
            ElementKind::Boolean => Some(DecisionMode::Boolean),
            ElementKind::Buttons => Some(DecisionMode::Buttons),
            ElementKind::Form => Some(DecisionMode::Form),
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Select,
    Multiselect,
}

impl FieldType {
    pub const ALL: [FieldType; 4] = [
        FieldType::Text,
        FieldType::Number,
        FieldType::Select,
        FieldType::Multiselect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Select => "select",
            FieldType::Multiselect => "multiselect",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Select-style fields must carry an `options` list.
    pub fn requires_options(&self) -> bool {
        matches!(self, FieldType::Select | FieldType::Multiselect)
    }
}

// ── Decision Mode ────────────────────────────────────────────

/// The category of human input an approval expects.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DecisionMode {
    Boolean,
    Buttons,
    Form,
}

impl DecisionMode {
    /// Derive the mode from a validated element list. Validation guarantees
    /// at most one mode is present, so the first decision element decides.
    pub fn of(elements: &[Element]) -> Option<DecisionMode> {
        elements.iter().find_map(Element::decision_mode)
    }
}

/// Which decision modes were seen while scanning an element list.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct DetectedModes {
    pub boolean: bool,
    pub buttons: bool,
    pub form: bool,
}

impl DetectedModes {
    pub fn mark(&mut self, mode: DecisionMode) {
        match mode {
            DecisionMode::Boolean => self.boolean = true,
            DecisionMode::Buttons => self.buttons = true,
            DecisionMode::Form => self.form = true,
        }
    }

    pub fn count(&self) -> usize {
        [self.boolean, self.buttons, self.form]
            .iter()
            .filter(|b| **b)
            .count()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.boolean {
            out.push("boolean");
        }
        if self.buttons {
            out.push("buttons");
        }
        if self.form {
            out.push("form");
        }
        out
    }
}
