use std::{fs, io, path::Path};

/// Set `key=value` in a dotenv-style file, replacing an existing assignment
/// (with or without `export`) or appending one. Other lines are kept as is.
pub fn upsert_env_var(path: &Path, key: &str, value: &str) -> io::Result<()> {
    let existing = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };

    let assignment = format!("{key}={value}");
    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            let body = line.trim_start();
            let body = body.strip_prefix("export ").unwrap_or(body);
            if !replaced && body.strip_prefix(key).is_some_and(|rest| rest.trim_start().starts_with('=')) {
                replaced = true;
                assignment.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(assignment);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    fs::write(path, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn tmp_env(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = PathBuf::from(format!("/tmp/{prefix}-{}-{ts}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join(".env")
    }

    #[test]
    fn creates_missing_file() {
        let path = tmp_env("tgkit-env-new");
        upsert_env_var(&path, "TELEGRAM_BOT_TOKEN", "1:abc").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "TELEGRAM_BOT_TOKEN=1:abc\n");
    }

    #[test]
    fn replaces_existing_assignment_and_keeps_the_rest() {
        let path = tmp_env("tgkit-env-replace");
        fs::write(
            &path,
            "# bot\nexport TELEGRAM_BOT_TOKEN=old\nTELEGRAM_BOT_TOKEN_BACKUP=x\nTELEGRAM_ALLOWED_USERS=1\n",
        )
        .unwrap();

        upsert_env_var(&path, "TELEGRAM_BOT_TOKEN", "2:new").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "# bot\nTELEGRAM_BOT_TOKEN=2:new\nTELEGRAM_BOT_TOKEN_BACKUP=x\nTELEGRAM_ALLOWED_USERS=1\n"
        );
    }

    #[test]
    fn appends_when_absent() {
        let path = tmp_env("tgkit-env-append");
        fs::write(&path, "A=1").unwrap();
        upsert_env_var(&path, "B", "2").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "A=1\nB=2\n");
    }
}
