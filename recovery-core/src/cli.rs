//! Option parsing for the resolved argument vector.
//!
//! Arguments arrive through the three-tier resolution (live argv, control
//! block, command file), not from an interactive shell, and an unknown
//! option must be skipped rather than abort the session. That rules out a
//! conventional fail-fast parser; this is a small hand scan with
//! getopt_long-style `--name=value` and `--name value` forms.

/// Parsed option set for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryOptions {
    pub send_intent: Option<String>,
    pub update_package: Option<String>,
    pub update_image: Option<String>,
    pub wipe_data: bool,
    pub wipe_cache: bool,
    pub wipe_all: bool,
    pub show_text: bool,
    pub just_exit: bool,
    pub factory_mode: Option<String>,
    pub locale: Option<String>,
}

/// Parse `args` (index 0 is the program name). Unknown options are logged
/// and skipped; a missing required value is treated the same way.
pub fn parse_args(args: &[String]) -> RecoveryOptions {
    let mut options = RecoveryOptions::default();
    let mut iter = args.iter().skip(1).peekable();

    while let Some(arg) = iter.next() {
        let (name, inline_value) = match arg.split_once('=') {
            Some((name, value)) => (name, Some(value.to_string())),
            None => (arg.as_str(), None),
        };
        // Required values may be inline (--opt=v) or the following token.
        let mut take_value = |what: &str| -> Option<String> {
            if inline_value.is_some() {
                return inline_value.clone();
            }
            match iter.peek() {
                Some(next) if !next.starts_with("--") => Some(
                    iter.next()
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                ),
                _ => {
                    log::warn!("option {} is missing its {}", name, what);
                    None
                }
            }
        };

        match name {
            "--send_intent" => options.send_intent = take_value("intent string"),
            "--update_package" => options.update_package = take_value("path"),
            "--update_image" => options.update_image = take_value("path"),
            "--locale" => options.locale = take_value("locale"),
            "--factory_mode" => options.factory_mode = take_value("mode"),
            "--wipe_data" => {
                options.wipe_data = true;
                options.wipe_cache = true;
            }
            "--wipe_cache" => options.wipe_cache = true,
            "--wipe_all" => {
                options.wipe_all = true;
                options.wipe_data = true;
                options.wipe_cache = true;
                options.show_text = true;
            }
            "--show_text" => options.show_text = true,
            "--just_exit" => options.just_exit = true,
            _ => log::warn!("Invalid command argument {:?}", arg),
        }
    }

    options
}

/// Rewrite legacy `CACHE:foo` package paths to `/cache/foo`.
pub fn normalize_package_path(path: &str) -> String {
    match path.strip_prefix("CACHE:") {
        Some(rest) => {
            let rewritten = format!("/cache/{}", rest);
            log::info!("replacing path {:?} with {:?}", path, rewritten);
            rewritten
        }
        None => path.to_string(),
    }
}
