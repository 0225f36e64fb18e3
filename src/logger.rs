use {
    backtrace::Backtrace,
    log::{Level, Log, Metadata, Record},
    parking_lot::Mutex,
    std::{
        io::{self, Write},
        sync::{
            Arc,
            atomic::{AtomicU32, Ordering::Relaxed},
        },
        time::SystemTime,
    },
};

pub struct Logger {
    level: AtomicU32,
    buffer: Mutex<Vec<u8>>,
}

impl Logger {
    /// Installs a logger that writes to stderr. Panics are logged together with a backtrace.
    ///
    /// Returns `None` if a logger was already installed.
    pub fn install_stderr(level: Level) -> Option<Arc<Self>> {
        let slf = Arc::new(Self {
            level: AtomicU32::new(level as _),
            buffer: Default::default(),
        });
        let res = log::set_boxed_logger(Box::new(LogWrapper {
            logger: slf.clone(),
        }));
        if res.is_err() {
            return None;
        }
        log::set_max_level(level.to_level_filter());
        std::panic::set_hook(Box::new(|p| {
            if let Some(loc) = p.location() {
                log::error!(
                    "Panic at {} line {} column {}",
                    loc.file(),
                    loc.line(),
                    loc.column()
                );
            } else {
                log::error!("Panic at unknown location");
            }
            if let Some(msg) = p.payload().downcast_ref::<&str>() {
                log::error!("Message: {}", msg);
            }
            if let Some(msg) = p.payload().downcast_ref::<String>() {
                log::error!("Message: {}", msg);
            }
            log::error!("Backtrace:\n{:?}", Backtrace::new());
        }));
        Some(slf)
    }

    pub fn set_level(&self, level: Level) {
        self.level.store(level as _, Relaxed);
        log::set_max_level(level.to_level_filter());
    }

    pub fn level(&self) -> Level {
        match self.level.load(Relaxed) {
            1 => Level::Error,
            2 => Level::Warn,
            3 => Level::Info,
            4 => Level::Debug,
            _ => Level::Trace,
        }
    }
}

struct LogWrapper {
    logger: Arc<Logger>,
}

impl Log for LogWrapper {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() as u32 <= self.logger.level.load(Relaxed)
    }

    fn log(&self, record: &Record) {
        if record.level() as u32 > self.logger.level.load(Relaxed) {
            return;
        }
        let buffer = &mut *self.logger.buffer.lock();
        buffer.clear();
        let now = SystemTime::now();
        let _ = if let Some(mp) = record.module_path() {
            writeln!(
                buffer,
                "[{} {:5} {}] {}",
                humantime::format_rfc3339_millis(now),
                record.level(),
                mp,
                record.args(),
            )
        } else {
            writeln!(
                buffer,
                "[{} {:5}] {}",
                humantime::format_rfc3339_millis(now),
                record.level(),
                record.args(),
            )
        };
        let _ = io::stderr().lock().write_all(buffer);
    }

    fn flush(&self) {
        // nothing
    }
}
