use std::path::{Path, PathBuf};

pub const LOG_FILE_BASENAME: &str = "datebook";
pub const LOG_FILE_SUFFIX: &str = "log";
pub const LOG_ROTATE_SIZE_BYTES: u64 = 100 * 1024 * 1024;
pub const LOG_ROTATE_KEEP_FILES: usize = 30;

/// Target for HTTP traffic to the hosted backend, so it can be filtered on its
/// own (`DATEBOOK_LOG=warn,datebook=info,datebook::remote=debug`).
pub const REMOTE_TARGET: &str = "datebook::remote";

pub fn log_directory(app_data_dir: &Path) -> PathBuf {
    app_data_dir.join("logs")
}

/// `DATEBOOK_LOG`, then `RUST_LOG`, then the build's default. Release builds
/// keep backend traffic at warn.
pub fn log_spec() -> String {
    let default_spec = if cfg!(debug_assertions) {
        "warn,datebook=debug"
    } else {
        "warn,datebook=info,datebook::remote=warn"
    };
    std::env::var("DATEBOOK_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| {
            std::env::var("RUST_LOG")
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
        .unwrap_or_else(|| default_spec.to_string())
}

#[cfg(all(feature = "app", not(test)))]
pub fn init_logging(app_data_dir: &Path) -> Result<(), flexi_logger::FlexiLoggerError> {
    use flexi_logger::{
        detailed_format, Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming, WriteMode,
    };

    let dir = log_directory(app_data_dir);
    std::fs::create_dir_all(&dir)?;

    Logger::try_with_str(log_spec())?
        .log_to_file(
            FileSpec::default()
                .directory(&dir)
                .basename(LOG_FILE_BASENAME)
                .suffix(LOG_FILE_SUFFIX),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .format_for_files(detailed_format)
        .rotate(
            Criterion::Size(LOG_ROTATE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(LOG_ROTATE_KEEP_FILES),
        )
        .duplicate_to_stdout(if cfg!(debug_assertions) {
            Duplicate::Info
        } else {
            Duplicate::None
        })
        .start()?;

    install_panic_hook();

    log::info!("logger initialized dir={} spec={}", dir.display(), log_spec());
    Ok(())
}

#[cfg(all(feature = "app", not(test)))]
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info: &std::panic::PanicHookInfo<'_>| {
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("<non-string panic payload>");
        let location = info
            .location()
            .map(|loc| loc.to_string())
            .unwrap_or_default();
        let thread = std::thread::current();
        // Controllers run on the caller's runtime; the thread name points at it.
        log::error!(
            "panic in thread {} at {location}: {payload}\n{}",
            thread.name().unwrap_or("<unnamed>"),
            std::backtrace::Backtrace::capture()
        );
        log::logger().flush();
        default_hook(info);
    }));
}
