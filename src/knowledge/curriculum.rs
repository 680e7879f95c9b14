//! The JavaScript curriculum the student can be taught.

/// Ordered list of curriculum concepts, from first lesson to last.
pub const JAVASCRIPT_CURRICULUM: &[&str] = &[
    "Variables",
    "Data Types",
    "Operators",
    "Conditionals",
    "Loops",
    "Functions",
    "Arrays",
    "Objects",
    "Scope",
    "Closures",
    "Callbacks",
    "Promises",
    "Async/Await",
    "Classes",
    "Modules",
    "Error Handling",
];

/// Resolve a concept name case-insensitively to its canonical spelling.
#[must_use]
pub fn canonical_concept(name: &str) -> Option<&'static str> {
    let name = name.trim();
    JAVASCRIPT_CURRICULUM
        .iter()
        .copied()
        .find(|concept| concept.eq_ignore_ascii_case(name))
}

/// Position of a concept in the curriculum.
#[must_use]
pub fn concept_index(name: &str) -> Option<usize> {
    let canonical = canonical_concept(name)?;
    JAVASCRIPT_CURRICULUM.iter().position(|c| *c == canonical)
}
