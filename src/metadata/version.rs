//! PEP 440 version normalization and calendar versions

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::error::{QpubError, Result};

fn pep440() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?ix)^\s*v?
            (?:(?P<epoch>\d+)!)?
            (?P<release>\d+(?:\.\d+)*)
            (?:[-_.]?(?P<pre_l>alpha|a|beta|b|preview|pre|c|rc)[-_.]?(?P<pre_n>\d+)?)?
            (?:-(?P<post_n1>\d+)|[-_.]?(?P<post_l>post|rev|r)[-_.]?(?P<post_n2>\d+)?)?
            (?:[-_.]?(?P<dev_l>dev)[-_.]?(?P<dev_n>\d+)?)?
            (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
            \s*$",
        )
        .expect("valid PEP 440 pattern")
    })
}

fn number(text: Option<regex::Match<'_>>) -> u64 {
    text.and_then(|m| m.as_str().parse().ok()).unwrap_or(0)
}

/// Normalize a version string to its canonical PEP 440 form
pub fn normalize(raw: &str) -> Result<String> {
    let caps = pep440()
        .captures(raw)
        .ok_or_else(|| QpubError::InvalidVersion(raw.to_string()))?;

    let mut out = String::new();
    let epoch = number(caps.name("epoch"));
    if epoch != 0 {
        out.push_str(&format!("{}!", epoch));
    }

    let release: Vec<String> = caps["release"]
        .split('.')
        .map(|part| part.parse::<u64>().map(|n| n.to_string()))
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| QpubError::InvalidVersion(raw.to_string()))?;
    out.push_str(&release.join("."));

    if let Some(label) = caps.name("pre_l") {
        let label = match label.as_str().to_lowercase().as_str() {
            "alpha" | "a" => "a",
            "beta" | "b" => "b",
            _ => "rc",
        };
        out.push_str(&format!("{}{}", label, number(caps.name("pre_n"))));
    }

    if let Some(n) = caps.name("post_n1") {
        out.push_str(&format!(".post{}", n.as_str().parse::<u64>().unwrap_or(0)));
    } else if caps.name("post_l").is_some() {
        out.push_str(&format!(".post{}", number(caps.name("post_n2"))));
    }

    if caps.name("dev_l").is_some() {
        out.push_str(&format!(".dev{}", number(caps.name("dev_n"))));
    }

    if let Some(local) = caps.name("local") {
        let local = local.as_str().to_lowercase().replace(['-', '_'], ".");
        out.push_str(&format!("+{}", local));
    }

    Ok(out)
}

/// Calendar version `YYYY.M.D` for a date
pub fn calver(date: NaiveDate) -> String {
    format!("{}.{}.{}", date.year(), date.month(), date.day())
}

/// Calendar version for today
pub fn calver_today() -> String {
    calver(chrono::Local::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        let cases = [
            ("0.0.1", "0.0.1"),
            ("v1.0", "1.0"),
            ("1.0.0-alpha.1", "1.0.0a1"),
            ("1.0beta", "1.0b0"),
            ("2.1-preview3", "2.1rc3"),
            ("1.0c1", "1.0rc1"),
            ("1.0-1", "1.0.post1"),
            ("1.0.rev", "1.0.post0"),
            ("1.0-dev2", "1.0.dev2"),
            ("1!02.010", "1!2.10"),
            ("0!1.0", "1.0"),
            ("1.0+Ubuntu-1", "1.0+ubuntu.1"),
        ];
        for (raw, expected) in cases {
            assert_eq!(normalize(raw).unwrap(), expected, "{}", raw);
        }
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            normalize("not a version"),
            Err(QpubError::InvalidVersion(_))
        ));
        assert!(normalize("").is_err());
    }

    #[test]
    fn test_calver() {
        let date = NaiveDate::from_ymd_opt(1969, 12, 9).unwrap();
        assert_eq!(calver(date), "1969.12.9");
        assert_eq!(normalize(&calver(date)).unwrap(), "1969.12.9");
    }
}
