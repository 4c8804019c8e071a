use std::{
    collections::HashSet,
    fs::File,
    io::{self, BufRead},
    path::Path,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read labels: {0}")]
    Io(#[from] io::Error),
    #[error("Empty class name on line {0}")]
    EmptyName(usize),
    #[error("Duplicate class name: {0}")]
    DuplicateName(String),
    #[error("Class catalog is empty")]
    Empty,
    #[error("Malformed class names metadata: {0}")]
    Metadata(String),
    #[error("Model carries no class names and no labels file is configured")]
    NoSource,
    #[error("Catalog lists {catalog} classes but the model scores {model}")]
    ClassCountMismatch { catalog: usize, model: usize },
}

/// Class names indexed by the model's class id. Built once at startup and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassCatalog {
    names: Box<[String]>,
}

impl ClassCatalog {
    pub fn from_names<I, S>(names: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut collected = Vec::new();
        for (line, name) in names.into_iter().enumerate() {
            let name: String = name.into();
            if name.is_empty() {
                return Err(CatalogError::EmptyName(line + 1));
            }
            if !seen.insert(name.clone()) {
                return Err(CatalogError::DuplicateName(name));
            }
            collected.push(name);
        }

        if collected.is_empty() {
            return Err(CatalogError::Empty);
        }

        Ok(Self {
            names: collected.into_boxed_slice(),
        })
    }

    /// Reads a labels file: one class per line, first comma-separated column
    /// is the name (`name` or `name,r,g,b`).
    pub fn load(filepath: &Path) -> Result<Self, CatalogError> {
        let file = File::open(filepath)?;
        Self::from_reader(io::BufReader::new(file))
    }

    pub fn from_reader(reader: impl BufRead) -> Result<Self, CatalogError> {
        let mut names = Vec::new();
        for line_result in reader.lines() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let name = line.split(',').next().unwrap_or_default().trim();
            names.push(name.to_string());
        }
        Self::from_names(names)
    }

    /// Parses the `names` metadata of an Ultralytics export, a Python dict
    /// literal such as `{0: 'paregi', 1: 'pelise'}`. Ids must run from 0
    /// without gaps.
    pub fn from_model_metadata(metadata: &str) -> Result<Self, CatalogError> {
        let malformed = || CatalogError::Metadata(metadata.to_string());
        let body = metadata
            .trim()
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(malformed)?;

        let mut entries = Vec::new();
        let mut rest = body.trim_start();
        while !rest.is_empty() {
            let (id, tail) = rest.split_once(':').ok_or_else(malformed)?;
            let id: usize = id
                .trim()
                .trim_matches(|c: char| c == '\'' || c == '"')
                .parse()
                .map_err(|_| malformed())?;

            let tail = tail.trim_start();
            let quote = tail
                .chars()
                .next()
                .filter(|c| *c == '\'' || *c == '"')
                .ok_or_else(malformed)?;
            let tail = &tail[1..];
            let end = tail.find(quote).ok_or_else(malformed)?;
            entries.push((id, tail[..end].to_string()));

            let tail = tail[end + 1..].trim_start();
            rest = tail.strip_prefix(',').unwrap_or(tail).trim_start();
        }

        entries.sort_by_key(|(id, _)| *id);
        if entries.iter().enumerate().any(|(i, (id, _))| i != *id) {
            return Err(malformed());
        }

        Self::from_names(entries.into_iter().map(|(_, name)| name))
    }

    /// Builds the catalog the service runs with: names embedded in the model
    /// win over the labels file, and the result must cover exactly the
    /// classes the model scores when that count is known.
    pub fn resolve(
        metadata: Option<&str>,
        labels_file: Option<&Path>,
        model_classes: Option<usize>,
    ) -> Result<Self, CatalogError> {
        let catalog = match (metadata, labels_file) {
            (Some(metadata), _) => Self::from_model_metadata(metadata)?,
            (None, Some(labels_file)) => Self::load(labels_file)?,
            (None, None) => return Err(CatalogError::NoSource),
        };

        if let Some(model) = model_classes {
            if model != catalog.len() {
                return Err(CatalogError::ClassCountMismatch {
                    catalog: catalog.len(),
                    model,
                });
            }
        }

        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn labels_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_from_reader_plain_and_colored_lines() {
        let reader = Cursor::new("paregi\n\npelise, 255, 0, 0\n");

        let catalog = ClassCatalog::from_reader(reader).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.name(0), Some("paregi"));
        assert_eq!(catalog.name(1), Some("pelise"));
        assert_eq!(catalog.name(2), None);
        assert!(catalog.contains("pelise"));
        assert!(!catalog.contains("other"));
    }

    #[test]
    fn test_load_from_file() {
        let file = labels_file("cat\ndog\n");

        let catalog = ClassCatalog::load(file.path()).unwrap();

        assert_eq!(catalog.names(), &["cat".to_string(), "dog".to_string()]);
    }

    #[test]
    fn test_rejects_invalid_catalogs() {
        assert!(matches!(
            ClassCatalog::from_reader(Cursor::new("")),
            Err(CatalogError::Empty)
        ));
        assert!(matches!(
            ClassCatalog::from_reader(Cursor::new("a\na\n")),
            Err(CatalogError::DuplicateName(name)) if name == "a"
        ));
        assert!(matches!(
            ClassCatalog::from_reader(Cursor::new("a\n,1,2,3\n")),
            Err(CatalogError::EmptyName(2))
        ));
        assert!(matches!(
            ClassCatalog::load(Path::new("/nonexistent/labels.txt")),
            Err(CatalogError::Io(_))
        ));
    }

    #[test]
    fn test_from_model_metadata() -> Result<(), CatalogError> {
        let metadata = "{0: 'paregi', 1: 'pelise'}";
        let catalog = ClassCatalog::from_model_metadata(metadata)?;
        assert_eq!(catalog.name(0), Some("paregi"));
        assert_eq!(catalog.name(1), Some("pelise"));

        let metadata = "{1: \"it's\", 0: 'a, b'}";
        let catalog = ClassCatalog::from_model_metadata(metadata)?;
        assert_eq!(catalog.name(0), Some("a, b"));
        assert_eq!(catalog.name(1), Some("it's"));

        Ok(())
    }

    #[test]
    fn test_from_model_metadata_rejects_malformed() {
        let inputs = ["", "[0, 1]", "{0: paregi}", "{0: 'a', 2: 'b'}", "{x: 'a'}"];
        for metadata in inputs {
            let result = ClassCatalog::from_model_metadata(metadata);
            assert!(
                matches!(result, Err(CatalogError::Metadata(_))),
                "accepted {:?}",
                metadata
            );
        }
    }

    #[test]
    fn test_resolve_prefers_model_metadata() -> Result<(), CatalogError> {
        let file = labels_file("a\nb\nc\n");
        let labels = file.path();
        let metadata = "{0: 'x', 1: 'y'}";

        let catalog = ClassCatalog::resolve(Some(metadata), Some(labels), Some(2))?;

        assert_eq!(catalog.names(), &["x".to_string(), "y".to_string()]);
        Ok(())
    }

    #[test]
    fn test_resolve_falls_back_to_labels_file() -> Result<(), CatalogError> {
        let file = labels_file("paregi\npelise\n");

        let catalog = ClassCatalog::resolve(None, Some(file.path()), Some(2))?;

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.name(1), Some("pelise"));
        Ok(())
    }

    #[test]
    fn test_resolve_rejects_class_count_mismatch() {
        let file = labels_file("a\nb\nc\n");

        let result = ClassCatalog::resolve(None, Some(file.path()), Some(2));

        assert!(matches!(
            result,
            Err(CatalogError::ClassCountMismatch {
                catalog: 3,
                model: 2
            })
        ));
    }

    #[test]
    fn test_resolve_without_any_source() {
        assert!(matches!(
            ClassCatalog::resolve(None, None, Some(2)),
            Err(CatalogError::NoSource)
        ));
    }
}
