use crate::error::ResolveError;

/// Pools whose name starts the note, compared case-insensitively. Blank names never match.
pub fn matching_pools<'a, S: AsRef<str>>(note: &str, pools: &'a [S]) -> Vec<&'a str> {
    let haystack = note.to_lowercase();
    pools
        .iter()
        .map(|pool| AsRef::<str>::as_ref(pool))
        .filter(|pool| !pool.trim().is_empty())
        .filter(|pool| haystack.starts_with(&pool.to_lowercase()))
        .collect()
}

/// The single pool the note is addressed to.
pub fn resolve_pool<S: AsRef<str>>(note: &str, pools: &[S]) -> Result<String, ResolveError> {
    match matching_pools(note, pools).as_slice() {
        [] => Err(ResolveError::NoPoolFound {
            note: note.to_string(),
        }),
        [pool] => Ok((*pool).to_string()),
        many => Err(ResolveError::AmbiguousPool {
            note: note.to_string(),
            candidates: many.iter().map(|p| (*p).to_string()).collect(),
        }),
    }
}
