macro_rules! log {
    ($logger:expr, $($arg:tt)*) => {{
        #[allow(unused_imports)]
        use $crate::util::logging::Logger as _;
        // The message is built before the logger is borrowed, so format
        // arguments may read fields of the logger's owner.
        let msg = ::std::format!($($arg)*);
        $logger.log(&msg);
    }};
}

pub trait Logger {
    fn log(&mut self, msg: &str);
}

impl<'a, T> Logger for &'a mut T
where
    T: Logger,
{
    fn log(&mut self, msg: &str) {
        T::log(self, msg);
    }
}

impl Logger for Box<dyn Logger> {
    fn log(&mut self, msg: &str) {
        (**self).log(msg);
    }
}

pub struct PrintLogger {
    name: String,
}

impl PrintLogger {
    #[must_use]
    pub const fn new(name: String) -> PrintLogger {
        PrintLogger { name }
    }
}

impl Logger for PrintLogger {
    fn log(&mut self, msg: &str) {
        println!("[{}] {}", self.name, msg);
    }
}

pub struct NothingLogger {}

impl NothingLogger {
    #[must_use]
    pub const fn new() -> NothingLogger {
        NothingLogger {}
    }
}

impl Default for NothingLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for NothingLogger {
    fn log(&mut self, _msg: &str) {}
}

/// Boxed logger for the given verbosity, named per agent.
#[must_use]
pub fn for_verbosity(verbose: bool, name: &str) -> Box<dyn Logger> {
    if verbose {
        Box::new(PrintLogger::new(name.to_owned()))
    } else {
        Box::new(NothingLogger::new())
    }
}
