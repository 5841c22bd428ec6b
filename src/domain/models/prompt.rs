#[cfg(test)]
#[path = "prompt_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionSelection {
    pub section: String,
    pub subsections: Vec<String>,
}

/// A library page picked as context, optionally narrowed to sections and
/// subsections.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LibrarySelection {
    pub page: String,
    pub sections: Vec<SectionSelection>,
}

impl LibrarySelection {
    pub fn page(page: &str) -> LibrarySelection {
        return LibrarySelection {
            page: page.to_string(),
            sections: vec![],
        };
    }

    /// Parses `page`, `page/section` or `page/section/subsection`.
    pub fn parse(path: &str) -> Option<LibrarySelection> {
        let parts = path
            .split('/')
            .map(|e| return e.trim())
            .filter(|e| return !e.is_empty())
            .collect::<Vec<&str>>();

        if parts.is_empty() || parts.len() > 3 {
            return None;
        }

        let mut selection = LibrarySelection::page(parts[0]);
        if parts.len() > 1 {
            let mut section = SectionSelection {
                section: parts[1].to_string(),
                subsections: vec![],
            };
            if parts.len() == 3 {
                section.subsections.push(parts[2].to_string());
            }
            selection.sections.push(section);
        }

        return Some(selection);
    }

    pub fn paths(&self) -> Vec<String> {
        if self.sections.is_empty() {
            return vec![self.page.to_string()];
        }

        let mut paths = vec![];
        for section in &self.sections {
            let base = format!("{}/{}", self.page, section.section);
            if section.subsections.is_empty() {
                paths.push(base);
                continue;
            }
            for subsection in &section.subsections {
                paths.push(format!("{base}/{subsection}"));
            }
        }

        return paths;
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PromptOptions {
    pub use_web_search: bool,
    pub libraries: Vec<LibrarySelection>,
    pub focus: Option<String>,
}

impl PromptOptions {
    pub fn selected_libraries(&self) -> Vec<String> {
        return self
            .libraries
            .iter()
            .flat_map(|library| return library.paths())
            .collect();
    }
}

/// Everything a backend needs to open a reply stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    pub prompt: String,
    pub conversation_id: String,
    pub use_web_search: bool,
    pub selected_libraries: Vec<String>,
    pub focus: Option<String>,
}

impl PromptRequest {
    pub fn new(prompt: &str, conversation_id: &str, options: &PromptOptions) -> PromptRequest {
        let focus = options
            .focus
            .as_ref()
            .map(|e| return e.trim().to_string())
            .filter(|e| return !e.is_empty());

        return PromptRequest {
            prompt: prompt.to_string(),
            conversation_id: conversation_id.to_string(),
            use_web_search: options.use_web_search,
            selected_libraries: options.selected_libraries(),
            focus,
        };
    }
}
