//! Name normalization shared by branches, threads, and message senders.
//!
//! Lowercases, collapses runs of non-alphanumeric characters to a single
//! hyphen, and strips leading/trailing hyphens. Used wherever a
//! human-chosen name needs a filesystem-safe, collision-checkable identity.

/// Normalize a name into its on-disk slug form.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_hyphen = false;

    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen && !out.is_empty() {
            out.push('-');
            last_was_hyphen = true;
        }
    }

    while out.ends_with('-') {
        out.pop();
    }

    out
}
