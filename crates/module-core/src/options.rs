//! Module option strings.
//!
//! Options are `:`-separated `key=value` items; a bare `key` is a flag.
//! Example: `delay=2:keyint=25:verbose`.

use std::collections::BTreeMap;
use std::str::FromStr;

use framewright_common::error::{FramewrightError, FramewrightResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleOptions {
    module: String,
    values: BTreeMap<String, Option<String>>,
}

impl ModuleOptions {
    /// Parse `options` for the module called `module`.
    pub fn parse(module: &str, options: &str) -> FramewrightResult<Self> {
        let mut values = BTreeMap::new();
        for item in options.split(':').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = match item.split_once('=') {
                Some((key, value)) => (key.trim(), Some(value.trim().to_string())),
                None => (item, None),
            };
            if key.is_empty() {
                return Err(FramewrightError::module_config(
                    module,
                    format!("malformed option '{item}'"),
                ));
            }
            values.insert(key.to_string(), value);
        }
        Ok(Self {
            module: module.to_string(),
            values,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_deref())
    }

    /// Whether `key` is present, with or without a value.
    pub fn flag(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Parse the value of `key`, `None` when absent.
    pub fn value<T: FromStr>(&self, key: &str) -> FramewrightResult<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                FramewrightError::module_config(
                    &self.module,
                    format!("invalid value '{raw}' for option '{key}'"),
                )
            }),
        }
    }

    /// Keys not in `known`, for warning about typos.
    pub fn unknown_keys<'a>(&'a self, known: &'a [&str]) -> impl Iterator<Item = &'a str> + 'a {
        self.values
            .keys()
            .map(String::as_str)
            .filter(move |k| !known.contains(k))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_values_and_flags() {
        let opts = ModuleOptions::parse("copy", "delay=2: verbose ::keyint=25").unwrap();
        assert_eq!(opts.get("delay"), Some("2"));
        assert_eq!(opts.value::<u32>("keyint").unwrap(), Some(25));
        assert!(opts.flag("verbose"));
        assert_eq!(opts.get("verbose"), None);
        assert_eq!(opts.value::<u32>("missing").unwrap(), None);
    }

    #[test]
    fn test_bad_values_name_the_module() {
        let opts = ModuleOptions::parse("copy", "delay=soon").unwrap();
        let err = opts.value::<usize>("delay").unwrap_err();
        assert!(err.to_string().contains("copy"));
        assert!(ModuleOptions::parse("copy", "=3").is_err());
    }

    #[test]
    fn test_unknown_keys() {
        let opts = ModuleOptions::parse("raw", "dealy=1:delay=1").unwrap();
        let unknown: Vec<_> = opts.unknown_keys(&["delay"]).collect();
        assert_eq!(unknown, vec!["dealy"]);
        assert!(ModuleOptions::parse("raw", "").unwrap().is_empty());
    }
}
