//! Detection of entry names that occur more than once in the merged output.

use std::collections::HashSet;

use log::warn;

use super::directory::CentralDirectory;

/// Shown in place of a zero-length entry name.
const EMPTY_NAME: &str = "<stdin>";

/// Report every name that repeats an earlier entry's name.
///
/// Names match only if they have the same length and the same bytes; a
/// name is never considered equal to a longer name it prefixes. Each repeat
/// is logged, followed by one summary warning, and the repeats are returned
/// in directory order. Nothing is removed from the directory.
pub fn find_duplicate_names(directory: &CentralDirectory) -> Vec<Vec<u8>> {
    let mut seen: HashSet<&[u8]> = HashSet::new();
    let mut duplicates = Vec::new();

    for entry in directory.entries() {
        let name = entry.name();
        if !seen.insert(name) {
            warn!("duplicate name: {}", display_name(name));
            duplicates.push(name.to_vec());
        }
    }

    if !duplicates.is_empty() {
        warn!("zip output is corrupted -- remedy the duplicates and retry");
    }
    duplicates
}

pub(crate) fn display_name(name: &[u8]) -> String {
    if name.is_empty() {
        EMPTY_NAME.to_string()
    } else {
        String::from_utf8_lossy(name).into_owned()
    }
}
