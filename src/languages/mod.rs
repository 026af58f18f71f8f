use lazy_static::lazy_static;
use log::info;
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;

#[derive(Debug)]
pub enum LanguageError {
    UnknownLanguage(String),
    EmptyTable(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for LanguageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanguageError::UnknownLanguage(code) =>
                write!(f, "Language '{}' is not in the supported table", code),
            LanguageError::EmptyTable(path) =>
                write!(f, "Language file '{}' contains no languages", path),
            LanguageError::IoError(e) => write!(f, "Language file IO error: {}", e),
            LanguageError::JsonError(e) => write!(f, "Language file parsing error: {}", e),
        }
    }
}

impl Error for LanguageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LanguageError::IoError(e) => Some(e),
            LanguageError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LanguageError {
    fn from(err: std::io::Error) -> Self {
        LanguageError::IoError(err)
    }
}

impl From<serde_json::Error> for LanguageError {
    fn from(err: serde_json::Error) -> Self {
        LanguageError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Language {
    pub code: String,
    pub name: String,
}

lazy_static! {
    static ref BUILTIN: Vec<Language> = vec![
        lang("en", "English"),
        lang("es", "Spanish"),
        lang("fr", "French"),
        lang("de", "German"),
        lang("zh", "Chinese"),
        lang("ar", "Arabic"),
        lang("hi", "Hindi (हिन्दी)"),
        lang("ta", "Tamil (தமிழ்)"),
        lang("ur", "Urdu (اردو)"),
        lang("ja", "Japanese"),
        lang("pt", "Portuguese"),
        lang("ru", "Russian"),
        lang("ko", "Korean"),
        lang("it", "Italian"),
        lang("bn", "Bengali (বাংলা)"),
        lang("te", "Telugu (తెలుగు)"),
        lang("mr", "Marathi (मराठी)"),
        lang("tr", "Turkish"),
        lang("vi", "Vietnamese"),
        lang("pl", "Polish")
    ];
}

fn lang(code: &str, name: &str) -> Language {
    Language {
        code: code.to_string(),
        name: name.to_string(),
    }
}

/// The product's supported-language table. Ships with a built-in list and
/// accepts a JSON file override of the same shape.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    languages: Vec<Language>,
}

impl LanguageRegistry {
    pub fn builtin() -> Self {
        Self {
            languages: BUILTIN.clone(),
        }
    }

    pub fn from_file(path: &str) -> Result<Self, LanguageError> {
        let content = fs::read_to_string(path)?;
        let languages: Vec<Language> = serde_json::from_str(&content)?;
        if languages.is_empty() {
            return Err(LanguageError::EmptyTable(path.to_string()));
        }
        info!("Loaded {} languages from {}", languages.len(), path);
        Ok(Self { languages })
    }

    pub fn all(&self) -> &[Language] {
        &self.languages
    }

    pub fn find(&self, code: &str) -> Option<&Language> {
        self.languages.iter().find(|l| l.code == code)
    }

    pub fn is_supported(&self, code: &str) -> bool {
        self.find(code).is_some()
    }

    pub fn ensure_supported(&self, code: &str) -> Result<(), LanguageError> {
        if self.is_supported(code) {
            Ok(())
        } else {
            Err(LanguageError::UnknownLanguage(code.to_string()))
        }
    }

    /// Display name for a code, falling back to the code itself.
    pub fn display_name<'a>(&'a self, code: &'a str) -> &'a str {
        self.find(code).map(|l| l.name.as_str()).unwrap_or(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_table_covers_the_product_languages() {
        let registry = LanguageRegistry::builtin();
        assert_eq!(registry.all().len(), 20);
        assert!(registry.is_supported("en"));
        assert!(registry.is_supported("ta"));
        assert_eq!(registry.display_name("es"), "Spanish");
        assert_eq!(registry.display_name("xx"), "xx");
        assert!(registry.ensure_supported("tlh").is_err());
    }

    #[test]
    fn file_override_replaces_the_builtin_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[{{\"code\":\"eo\",\"name\":\"Esperanto\"}}]").unwrap();

        let registry = LanguageRegistry::from_file(file.path().to_str().unwrap()).unwrap();
        assert!(registry.is_supported("eo"));
        assert!(!registry.is_supported("en"));
    }

    #[test]
    fn empty_override_files_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();
        assert!(matches!(
            LanguageRegistry::from_file(file.path().to_str().unwrap()),
            Err(LanguageError::EmptyTable(_))
        ));
    }
}
