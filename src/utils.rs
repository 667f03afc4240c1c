#[cfg(test)]
pub(crate) mod test_helpers {
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Knobs for the stub helper script.
    pub struct StubOptions {
        /// Response body printed on stdout for every `-execute`.
        pub body: String,
        /// Seconds slept before responding ("0" responds immediately).
        pub delay: String,
        /// Corrupt the first command's stderr await marker so the two
        /// channels disagree on the command id.
        pub desync_first: bool,
    }

    impl Default for StubOptions {
        fn default() -> Self {
            Self {
                body: String::new(),
                delay: "0".to_string(),
                desync_first: false,
            }
        }
    }

    const STUB_TEMPLATE: &str = r#"#!/bin/sh
# Minimal imitation of `exiftool -stay_open true -@ -`.
body='__BODY__'
delay='__DELAY__'
desync='__DESYNC__'
stay_open=1
count=0
e3=''
e4=''
while [ "$stay_open" -eq 1 ] && IFS= read -r line; do
  case "$line" in
    -stay_open)
      IFS= read -r flag || break
      case "$flag" in
        [Ff]alse) stay_open=0 ;;
      esac
      ;;
    -echo1)
      IFS= read -r payload || break
      printf '%s\n' "$payload"
      ;;
    -echo2)
      IFS= read -r payload || break
      count=$((count+1))
      if [ "$desync" = "1" ] && [ "$count" -eq 1 ]; then
        printf '{await1999999999}\n' >&2
      else
        printf '%s\n' "$payload" >&2
      fi
      ;;
    -echo3)
      IFS= read -r payload || break
      e3="$payload"
      ;;
    -echo4)
      IFS= read -r payload || break
      e4="$payload"
      ;;
    -execute)
      if [ "$delay" != "0" ]; then sleep "$delay"; fi
      if [ -n "$body" ]; then printf '%s\n' "$body"; fi
      if [ -n "$e3" ]; then printf '%s\n' "$e3"; fi
      printf '{ready}\n'
      if [ -n "$e4" ]; then printf '%s\n' "$e4" >&2; fi
      e3=''
      e4=''
      ;;
  esac
done
exit 0
"#;

    /// Writes an executable stub helper speaking the stay-open wire
    /// protocol into `dir` and returns its path.
    pub fn stub_helper(dir: &TempDir, options: &StubOptions) -> PathBuf {
        let script = STUB_TEMPLATE
            .replace("__BODY__", &options.body.replace('\'', r"'\''"))
            .replace("__DELAY__", &options.delay)
            .replace("__DESYNC__", if options.desync_first { "1" } else { "0" });

        let path = dir.path().join("stub-exiftool");
        fs::write(&path, script).expect("write stub helper");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .expect("chmod stub helper");
        }

        path
    }
}
