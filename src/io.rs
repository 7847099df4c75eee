/// Destination for output produced by the `print` builtin and by diagnostic
/// reports such as uncaught-exception tracebacks.
///
/// The interpreter never writes to stdout directly; everything goes through a
/// `PrintWriter` so embedders and tests can capture or discard output.
pub trait PrintWriter {
    /// Writes one already-formatted chunk of text, with no separator or
    /// terminator added.
    fn out(&mut self, text: &str);

    /// Writes a single separator or terminator character (a space between
    /// `print` arguments, the trailing newline).
    fn out_char(&mut self, c: char);
}

/// Writes everything to the process stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn out(&mut self, text: &str) {
        print!("{text}");
    }

    fn out_char(&mut self, c: char) {
        print!("{c}");
    }
}

/// Accumulates all output in a string, for tests and embedders that want to
/// inspect what a program printed.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    /// The output collected so far.
    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    /// Consumes the writer, returning the collected output.
    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn out(&mut self, text: &str) {
        self.0.push_str(text);
    }

    fn out_char(&mut self, c: char) {
        self.0.push(c);
    }
}

/// Discards all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn out(&mut self, _text: &str) {}

    fn out_char(&mut self, _c: char) {}
}
