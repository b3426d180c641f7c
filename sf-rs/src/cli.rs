//! `sf` command line.
//!
//!   sf [-dlt] [-f[<file>]] [-e <expr>] [<script>]
//!
//! Single-letter flags may be bundled (`-dt`).  `-f` and `-e` consume the
//! rest of their bundle, or the next argument when the bundle ends.

use std::path::PathBuf;

pub const USAGE: &str = "Usage: sf [-dlt] [-f[<file>]] [-e <expr>] [<script>]";

// ── Options ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Options {
    /// Where settings come from.
    pub config: ConfigSource,
    /// `-e <expr>`: evaluate and print.
    pub expr: Option<String>,
    /// `-l`: dump every identifier a script can use.
    pub list_names: bool,
    /// `-t`: print `-e` results in stream form.
    pub typed: bool,
    pub debug: bool,
    pub script: Option<PathBuf>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// `sfrc` in the user config directory, when present.
    #[default]
    UserDefault,
    /// Bare `-f`.
    Disabled,
    File(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

pub fn parse_args() -> Result<Options, String> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    parse_argv(&argv)
}

pub fn parse_argv(argv: &[String]) -> Result<Options, String> {
    let mut opts = Options::default();
    let mut rest = argv.iter().peekable();
    let mut scripts: Vec<&String> = Vec::new();

    while let Some(arg) = rest.next() {
        let Some(bundle) = arg.strip_prefix('-').filter(|b| !b.is_empty()) else {
            scripts.push(arg);
            continue;
        };
        if bundle == "-" {
            scripts.extend(rest.by_ref());
            break;
        }

        for (at, flag) in bundle.char_indices() {
            let tail = &bundle[at + flag.len_utf8()..];
            match flag {
                'd' => opts.debug = true,
                'l' => opts.list_names = true,
                't' => opts.typed = true,
                'f' => {
                    opts.config = if !tail.is_empty() {
                        ConfigSource::File(tail.into())
                    } else if let Some(file) = rest.next_if(|a| !a.starts_with('-')) {
                        ConfigSource::File(file.into())
                    } else {
                        ConfigSource::Disabled
                    };
                    break;
                }
                'e' => {
                    let expr = if !tail.is_empty() {
                        tail.to_owned()
                    } else {
                        rest.next().ok_or("-e requires an expression")?.clone()
                    };
                    opts.expr = Some(expr);
                    break;
                }
                other => return Err(format!("unknown option: -{other}")),
            }
        }
    }

    if scripts.len() > 1 {
        return Err(format!("expected one script, got {}", scripts.len()));
    }
    opts.script = scripts.pop().map(PathBuf::from);
    Ok(opts)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, String> {
        let owned: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        parse_argv(&owned)
    }

    #[test]
    fn nothing_given() {
        let o = parse(&[]).unwrap();
        assert_eq!(o.config, ConfigSource::UserDefault);
        assert!(o.script.is_none());
        assert!(o.expr.is_none());
    }

    #[test]
    fn script_path() {
        assert_eq!(parse(&["pump.sf"]).unwrap().script, Some(PathBuf::from("pump.sf")));
        assert_eq!(parse(&["-"]).unwrap().script, Some(PathBuf::from("-")));
    }

    #[test]
    fn bundled_flags() {
        let o = parse(&["-dlt"]).unwrap();
        assert!(o.debug);
        assert!(o.list_names);
        assert!(o.typed);
    }

    #[test]
    fn expression_argument() {
        assert_eq!(parse(&["-e", "1 + 2"]).unwrap().expr.as_deref(), Some("1 + 2"));
        let o = parse(&["-te3*4"]).unwrap();
        assert!(o.typed);
        assert_eq!(o.expr.as_deref(), Some("3*4"));
        assert_eq!(parse(&["-e", "-1"]).unwrap().expr.as_deref(), Some("-1"));
        assert!(parse(&["-e"]).is_err());
    }

    #[test]
    fn config_sources() {
        assert_eq!(parse(&["-f"]).unwrap().config, ConfigSource::Disabled);
        assert_eq!(parse(&["-fmy.rc"]).unwrap().config, ConfigSource::File("my.rc".into()));
        let o = parse(&["-f", "my.rc", "run.sf"]).unwrap();
        assert_eq!(o.config, ConfigSource::File("my.rc".into()));
        assert_eq!(o.script, Some(PathBuf::from("run.sf")));
        let o = parse(&["run.sf", "-f"]).unwrap();
        assert_eq!(o.config, ConfigSource::Disabled);
    }

    #[test]
    fn dash_dash_takes_the_rest_as_scripts() {
        assert_eq!(parse(&["--", "-odd.sf"]).unwrap().script, Some(PathBuf::from("-odd.sf")));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&["a.sf", "b.sf"]).is_err());
        assert!(parse(&["-z"]).is_err());
    }
}
