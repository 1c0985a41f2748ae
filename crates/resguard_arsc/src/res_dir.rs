//! Renamed resource directories (`res/drawable-hdpi` -> `r/b`).

use camino::Utf8Path;
use std::collections::BTreeMap;

use crate::error::{ResguardError, Result};
use crate::mapping::PriorMapping;
use crate::name_gen::ShortNameGenerator;

/// Old directory path (`res/<dir>`) to new directory path.
#[derive(Debug, Clone, Default)]
pub struct ResDirMap {
    dirs: BTreeMap<String, String>,
}

impl ResDirMap {
    /// List the directories under `<input_root>/res` and assign each a new path.
    pub fn build(
        input_root: &Utf8Path,
        keep_root: bool,
        res_dir_name: &str,
        prior: &PriorMapping,
    ) -> Result<Self> {
        let res_root = input_root.join("res");
        let mut names = Vec::new();
        if res_root.is_dir() {
            for entry in res_root.read_dir_utf8()? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    names.push(entry.file_name().to_string());
                }
            }
        } else {
            tracing::warn!("no res directory under {}", input_root);
        }
        Self::from_dir_names(names, keep_root, res_dir_name, prior)
    }

    /// Assign new paths to the given directory names, in sorted order.
    pub fn from_dir_names<I, S>(
        names: I,
        keep_root: bool,
        res_dir_name: &str,
        prior: &PriorMapping,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        names.sort();

        let prefix = format!("{}/", res_dir_name);
        let mut generator = ShortNameGenerator::new();
        generator.reset(&[]);
        generator.remove_all(
            prior
                .dirs()
                .values()
                .filter_map(|kept| kept.strip_prefix(&prefix)),
        );

        let mut dirs = BTreeMap::new();
        for name in names {
            let original = format!("res/{}", name);
            let new_path = if keep_root {
                original.clone()
            } else if let Some(kept) = prior.dir(&original) {
                kept.to_string()
            } else {
                let short = generator
                    .take()
                    .ok_or_else(|| ResguardError::NamespaceExhausted {
                        type_name: "res directories".to_string(),
                        count: generator.issued(),
                    })?;
                format!("{}{}", prefix, short)
            };
            dirs.insert(original, new_path);
        }
        Ok(Self { dirs })
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.dirs.get(original).map(String::as_str)
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.dirs
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}
