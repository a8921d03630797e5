//! Flag-delimited identifier scan over invocation arguments.

/// Collect the tokens that follow `flag`, up to the next token starting with
/// `-` or the end of `args`.
///
/// Every occurrence of `flag` opens a new run of identifiers; order is the
/// order in which tokens are encountered.
pub fn scan_identifiers<I, S>(args: I, flag: &str) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut identifiers = Vec::new();
    let mut collecting = false;
    for arg in args {
        let arg = arg.as_ref();
        if arg == flag {
            collecting = true;
            continue;
        }
        if arg.starts_with('-') {
            collecting = false;
            continue;
        }
        if collecting {
            identifiers.push(arg.to_string());
        }
    }
    identifiers
}
