use std::{
    path::{Component, Path, PathBuf},
    sync::LazyLock,
};

use chrono::{DateTime, Datelike, Local, NaiveTime, TimeZone, Timelike, Utc};
use regex::Regex;

static BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(.*?)\]").expect("bracket regex is valid"));

/// Parses the leading `[HH:MM:SS]` of a server log line as today's local time.
pub fn extract_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let time_s = BRACKET_RE.captures(input.trim_start())?.get(1)?.as_str();
    let time = NaiveTime::parse_from_str(time_s, "%H:%M:%S").ok()?;

    let today = Local::now().date_naive();

    let local_dt = Local
        .with_ymd_and_hms(
            today.year(),
            today.month(),
            today.day(),
            time.hour(),
            time.minute(),
            time.second(),
        )
        .single()?;

    Some(local_dt.with_timezone(&Utc))
}

/// Relative path with `.` dropped; absolute paths and `..` are refused.
pub fn normalize_rel_path(rel: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for c in Path::new(rel.trim()).components() {
        match c {
            Component::CurDir => {}
            Component::Normal(seg) => out.push(seg),
            Component::ParentDir | Component::Prefix(_) | Component::RootDir => return None,
        }
    }
    Some(out)
}

/// A bare file name: one normal path component, nothing else.
pub fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

pub fn has_jar_extension(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".jar")
}

/// First root-level jar of `dir`, preferring names that contain "server".
pub async fn find_server_jar(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut jars: Vec<String> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if has_jar_extension(&name) {
            jars.push(name);
        }
    }

    jars.sort();
    let pick = jars
        .iter()
        .find(|n| n.to_ascii_lowercase().contains("server"))
        .or_else(|| jars.first());

    Ok(pick.map(|n| dir.join(n)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_taken_from_leading_brackets() {
        let ts = extract_timestamp("[13:37:00] [Server thread/INFO]: Done").unwrap();
        let local = ts.with_timezone(&Local);
        assert_eq!((local.hour(), local.minute()), (13, 37));

        assert!(extract_timestamp("no brackets here").is_none());
        assert!(extract_timestamp("[not a time] x").is_none());
    }

    #[test]
    fn rel_paths_cannot_escape() {
        assert_eq!(
            normalize_rel_path("./mods/a.jar"),
            Some(PathBuf::from("mods/a.jar"))
        );
        assert_eq!(normalize_rel_path("../etc/passwd"), None);
        assert_eq!(normalize_rel_path("/etc/passwd"), None);
    }

    #[test]
    fn plain_file_names() {
        assert!(is_plain_file_name("EssentialsX.jar"));
        assert!(!is_plain_file_name("plugins/EssentialsX.jar"));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name(""));
    }

    #[tokio::test]
    async fn server_jar_scan_prefers_server_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a-library.jar"), b"x").unwrap();
        std::fs::write(dir.path().join("fabric-server-launch.jar"), b"x").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("mods")).unwrap();

        let jar = find_server_jar(dir.path()).await.unwrap().unwrap();
        assert_eq!(jar, dir.path().join("fabric-server-launch.jar"));

        let empty = tempfile::tempdir().unwrap();
        assert!(find_server_jar(empty.path()).await.unwrap().is_none());
    }
}
