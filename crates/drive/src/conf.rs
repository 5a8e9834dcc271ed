//! Parsing of the tool's INI-like config file.
//!
//! `~/.config/rclone/rclone.conf` holds one `[section]` per configured
//! remote with a `type = …` line. Only the name/type pairs matter here;
//! authorization keys are opaque to us.

/// A configured remote: section name plus backend type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInfo {
    pub name: String,
    pub kind: String,
}

/// Extracts `{name, type}` pairs from config file contents.
///
/// Unknown keys, comments (`#` / `;`) and blank lines are skipped.
/// Sections without a `type` line are reported with an empty kind.
pub fn parse_conf(contents: &str) -> Vec<RemoteInfo> {
    let mut remotes = Vec::new();
    let mut current: Option<RemoteInfo> = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            if let Some(done) = current.take() {
                remotes.push(done);
            }
            current = Some(RemoteInfo {
                name: name.trim().to_string(),
                kind: String::new(),
            });
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "type" {
                if let Some(remote) = current.as_mut() {
                    remote.kind = value.trim().to_string();
                }
            }
        }
    }

    if let Some(done) = current.take() {
        remotes.push(done);
    }
    remotes
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# rclone config
[gdrive]
type = drive
client_id = abc.apps.example.com
token = {"access_token":"xyz"}

[s3-backup]
type = s3
provider = AWS

; disabled remote
[scratch]
type = local
"#;

    #[test]
    fn parses_all_sections() {
        let remotes = parse_conf(SAMPLE);
        assert_eq!(
            remotes,
            vec![
                RemoteInfo {
                    name: "gdrive".into(),
                    kind: "drive".into()
                },
                RemoteInfo {
                    name: "s3-backup".into(),
                    kind: "s3".into()
                },
                RemoteInfo {
                    name: "scratch".into(),
                    kind: "local".into()
                },
            ]
        );
    }

    #[test]
    fn empty_input() {
        assert!(parse_conf("").is_empty());
        assert!(parse_conf("# only comments\n").is_empty());
    }

    #[test]
    fn section_without_type() {
        let remotes = parse_conf("[broken]\nclient_id = x\n");
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes[0].name, "broken");
        assert!(remotes[0].kind.is_empty());
    }

    #[test]
    fn whitespace_tolerant() {
        let remotes = parse_conf("  [ gdrive ]  \n   type   =   drive  \n");
        assert_eq!(remotes[0].name, "gdrive");
        assert_eq!(remotes[0].kind, "drive");
    }
}
