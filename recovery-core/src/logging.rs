use crate::paths::TEMPORARY_LOG_FILE;

pub fn init() {
    init_with(Some(TEMPORARY_LOG_FILE.as_ref()))
}

pub fn init_with(log_file: Option<&std::path::Path>) {
    use env_logger::Target;
    use std::fs;
    use std::io;

    // Prefer the temporary log file so finish-up can copy a complete session
    // log to cache. If it cannot be opened (readonly /tmp, very early boot),
    // fall back to stderr.
    let target = log_file
        .and_then(|path| {
            (|| -> io::Result<Target> {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
                Ok(Target::Pipe(Box::new(file)))
            })()
            .ok()
        })
        .unwrap_or(Target::Stderr);

    env_logger::Builder::from_default_env()
        .target(target)
        .filter_level(log::LevelFilter::Info)
        .init();
}
