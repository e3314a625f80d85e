use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use std::fs;
use std::path::PathBuf;

/// `$FSHIFT_HOME`, or `~/.fshift`
pub fn fshift_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("FSHIFT_HOME") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".fshift"))
}

pub fn ensure_fshift_home() -> Result<PathBuf> {
    let dir = fshift_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn parse_timezone(tz: &str) -> Result<Tz> {
    tz.parse()
        .map_err(|_| anyhow::anyhow!("invalid timezone: {tz}"))
}

/// Calendar date right now in the IANA zone `tz`.
pub fn local_today(tz: &str) -> Result<NaiveDate> {
    let tz = parse_timezone(tz)?;
    Ok(Utc::now().with_timezone(&tz).date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timezone() {
        assert!(parse_timezone("America/Chicago").is_ok());
        assert!(parse_timezone("Mars/Olympus").is_err());
    }

    #[test]
    fn test_date_depends_on_zone() {
        // 03:30 UTC on Mar 10 is still Mar 9 in Chicago
        let instant = Utc.with_ymd_and_hms(2026, 3, 10, 3, 30, 0).unwrap();
        let chicago = parse_timezone("America/Chicago").unwrap();
        assert_eq!(
            instant.with_timezone(&chicago).date_naive(),
            NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
        );
        assert!(local_today("Asia/Tokyo").is_ok());
    }
}
