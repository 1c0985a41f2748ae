//! Short replacement names.
//!
//! Candidates are issued shortest first: `a`..`z`, then a letter followed by one
//! character of `a-z0-9_`, then a letter followed by two. The candidate list is
//! built once per process; [`ShortNameGenerator::reset`] only filters it.

use regex::Regex;
use std::collections::{HashSet, VecDeque};
use std::sync::OnceLock;

const LEADING: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const TRAILING: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789_";

/// Reserved device names that cannot be used as file names on Windows.
const FILE_NAME_BLACKLIST: [&str; 4] = ["con", "prn", "aux", "nul"];

fn candidates() -> &'static [String] {
    static CANDIDATES: OnceLock<Vec<String>> = OnceLock::new();
    CANDIDATES.get_or_init(|| {
        let mut names = Vec::with_capacity(
            LEADING.len() * (1 + TRAILING.len() + TRAILING.len() * TRAILING.len()),
        );
        for &first in LEADING {
            names.push((first as char).to_string());
        }
        for &first in LEADING {
            for &second in TRAILING {
                names.push(String::from_utf8_lossy(&[first, second]).into_owned());
            }
        }
        for &first in LEADING {
            for &second in TRAILING {
                for &third in TRAILING {
                    names.push(String::from_utf8_lossy(&[first, second, third]).into_owned());
                }
            }
        }
        names
    })
}

/// Total number of names the generator can ever issue for one type.
pub fn capacity() -> usize {
    candidates().len() - FILE_NAME_BLACKLIST.len()
}

/// Issues collision-free short names for one resource type at a time.
#[derive(Debug, Default)]
pub struct ShortNameGenerator {
    queue: VecDeque<&'static str>,
    removed: HashSet<String>,
    issued: usize,
}

impl ShortNameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start over for a new type, skipping every candidate matched by `blacklist`.
    pub fn reset(&mut self, blacklist: &[Regex]) {
        self.removed.clear();
        self.issued = 0;
        self.queue = candidates()
            .iter()
            .map(String::as_str)
            .filter(|name| !FILE_NAME_BLACKLIST.contains(name))
            .filter(|name| !blacklist.iter().any(|pattern| pattern.is_match(name)))
            .collect();
    }

    /// Permanently discard the given candidates for the current type.
    pub fn remove_all<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.removed.extend(names.into_iter().map(Into::into));
    }

    /// Pop the next free name, or `None` once the namespace is exhausted.
    pub fn take(&mut self) -> Option<String> {
        while let Some(name) = self.queue.pop_front() {
            if self.removed.contains(name) {
                continue;
            }
            self.issued += 1;
            return Some(name.to_string());
        }
        None
    }

    /// How many names were issued since the last reset.
    pub fn issued(&self) -> usize {
        self.issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn take_n(generator: &mut ShortNameGenerator, n: usize) -> Vec<String> {
        (0..n).map(|_| generator.take().unwrap()).collect()
    }

    #[test]
    fn test_single_letters_first() {
        let mut generator = ShortNameGenerator::new();
        generator.reset(&[]);
        let expected: Vec<String> = ('a'..='z').map(String::from).collect();
        assert_eq!(take_n(&mut generator, 26), expected);
        assert_eq!(generator.take().as_deref(), Some("aa"));
    }

    #[test]
    fn test_blacklisted_letter_is_skipped() {
        let mut generator = ShortNameGenerator::new();
        generator.reset(&[Regex::new("^z$").unwrap()]);
        let names = take_n(&mut generator, 26);
        let expected: Vec<String> = ('a'..='y').map(String::from).collect();
        assert_eq!(&names[..25], expected.as_slice());
        assert_eq!(names[25], "aa");
    }

    #[test]
    fn test_remove_all_reserves_names() {
        let mut generator = ShortNameGenerator::new();
        generator.reset(&[]);
        generator.remove_all(["a", "c"]);
        assert_eq!(take_n(&mut generator, 3), vec!["b", "d", "e"]);
    }

    #[test]
    fn test_windows_device_names_never_issued() {
        let mut generator = ShortNameGenerator::new();
        generator.reset(&[]);
        let mut all = Vec::new();
        while let Some(name) = generator.take() {
            all.push(name);
        }
        assert_eq!(all.len(), capacity());
        for reserved in FILE_NAME_BLACKLIST {
            assert!(!all.iter().any(|name| name == reserved));
        }
        assert_eq!(generator.issued(), capacity());
        assert_eq!(all.last().map(String::as_str), Some("z__"));
    }

    #[test]
    fn test_reset_restores_queue() {
        let mut generator = ShortNameGenerator::new();
        generator.reset(&[]);
        generator.remove_all(["a"]);
        generator.take();
        generator.reset(&[]);
        assert_eq!(generator.take().as_deref(), Some("a"));
    }
}
