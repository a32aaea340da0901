/// Normalize a package version string for lookups against the gallery.
///
/// Build metadata is dropped, numeric parts lose leading zeros, the core is
/// padded to three parts and a zero fourth part is removed. The pre-release
/// label is kept as-is. Versions whose core is not numeric are returned trimmed
/// but otherwise unchanged.
pub fn normalize_version(version: &str) -> String {
    let trimmed = version.trim();
    let without_metadata = trimmed.split('+').next().unwrap_or(trimmed);

    let (core, release) = match without_metadata.split_once('-') {
        Some((core, release)) => (core, Some(release)),
        None => (without_metadata, None),
    };

    let parts: Option<Vec<u64>> = core.split('.').map(|p| p.parse::<u64>().ok()).collect();
    let mut parts = match parts {
        Some(parts) if (1..=4).contains(&parts.len()) => parts,
        _ => return trimmed.to_string(),
    };

    while parts.len() < 3 {
        parts.push(0);
    }
    if parts.len() == 4 && parts[3] == 0 {
        parts.pop();
    }

    let mut normalized = parts
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(".");

    if let Some(release) = release.filter(|r| !r.is_empty()) {
        normalized.push('-');
        normalized.push_str(release);
    }

    normalized
}
