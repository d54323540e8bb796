use std::cmp::Ordering;

use semver::Version;

/// Strip every leading `v`/`V` from a release tag.
///
/// Nothing else is parsed or validated, so malformed tags pass through.
#[must_use]
pub fn normalize_version(raw: &str) -> &str {
    raw.trim_start_matches(['v', 'V'])
}

/// Whether `candidate` is strictly newer than `current`.
///
/// Both sides are compared as semantic versions, padding short forms like
/// `1.2` to `1.2.0`. Tags that are not semver at all fall back to a
/// segment-wise comparison so a strict ordering is still defined.
#[must_use]
pub fn is_newer_version(candidate: &str, current: &str) -> bool {
    compare_versions(candidate, current) == Ordering::Greater
}

#[must_use]
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    match (parse_semver(left), parse_semver(right)) {
        (Some(left), Some(right)) => left.cmp_precedence(&right),
        _ => compare_segments(left, right),
    }
}

fn parse_semver(version: &str) -> Option<Version> {
    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }

    let (core, suffix) = split_semver_core_and_suffix(version);
    let mut parts = core.split('.');
    let major = parts.next()?.parse::<u64>().ok()?;
    let minor = parts.next().and_then(|part| part.parse::<u64>().ok());
    let patch = parts.next().and_then(|part| part.parse::<u64>().ok());

    if parts.next().is_some() {
        return None;
    }

    let normalized = match (minor, patch) {
        (None, None) => format!("{major}.0.0{suffix}"),
        (Some(minor), None) => format!("{major}.{minor}.0{suffix}"),
        (Some(minor), Some(patch)) => format!("{major}.{minor}.{patch}{suffix}"),
        (None, Some(_)) => return None,
    };

    Version::parse(&normalized).ok()
}

fn split_semver_core_and_suffix(version: &str) -> (&str, &str) {
    let suffix_idx = version.find(['-', '+']).unwrap_or(version.len());
    (&version[..suffix_idx], &version[suffix_idx..])
}

fn compare_segments(left: &str, right: &str) -> Ordering {
    let mut left_parts = left.split(['.', '-', '+', '_']);
    let mut right_parts = right.split(['.', '-', '+', '_']);

    loop {
        match (left_parts.next(), right_parts.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(l), Some(r)) => {
                let ordering = match (numeric_digits(l), numeric_digits(r)) {
                    (Some(l), Some(r)) => l.len().cmp(&r.len()).then_with(|| l.cmp(r)),
                    // numeric segments rank above textual ones ("1.0.1" > "1.0.beta")
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => l.cmp(r),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

/// Digits of an all-numeric segment without leading zeros, so numbers of
/// any length compare by length and then lexically.
fn numeric_digits(segment: &str) -> Option<&str> {
    if segment.is_empty() || !segment.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    Some(segment.trim_start_matches('0'))
}
