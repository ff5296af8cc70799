//! Ambient logging helper shared across the generator, driver, and CLI.

use std::fmt::Display;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

/// Manages optional logging of displayable types to a file in a debug
/// directory. Cheap to clone and pass down into the driver's recursive walk
/// (an `Rc`, not the path string itself) since every analysis unit shares
/// the same debug directory for one run.
#[derive(Clone, Default)]
pub struct FileDebugLogger {
    debug_dir: Rc<Option<String>>,
}

impl FileDebugLogger {
    /// Creates a new [`FileDebugLogger`] that emits files into `debug_dir`.
    /// If `debug_dir` is `None`, no logging occurs and [`Self::is_logging`]
    /// returns `false`.
    pub fn new(debug_dir: Option<String>) -> FileDebugLogger {
        FileDebugLogger {
            debug_dir: Rc::new(debug_dir),
        }
    }

    /// Logs the given displayable type into a file named `fname` if logging
    /// is enabled. `displayable` is a closure rather than a plain value so
    /// callers can skip building an expensive `Display` when logging is
    /// off.
    pub fn log_to_fname<V: Display>(
        &self,
        fname: &str,
        displayable: &impl Fn() -> V,
    ) -> anyhow::Result<()> {
        if let Some(debug_dir) = self.debug_dir.as_ref() {
            let mut pth = PathBuf::from(debug_dir);
            pth.push(fname);

            let mut out_file = std::fs::File::create(pth)?;
            writeln!(&mut out_file, "{}", displayable())?;
        }
        Ok(())
    }

    /// Whether logging will have an effect — useful to skip an expensive
    /// computation that can't happen inside the `Display` closure itself.
    pub fn is_logging(&self) -> bool {
        self.debug_dir.is_some()
    }
}
