use crate::bytecode::Frame;

/// Where a generator is in its lifecycle.
///
/// The suspended frame is owned by the generator and physically taken out of
/// it while the generator body runs (`Running`), so re-entering an executing
/// generator is impossible by construction, not just by flag-checking.
#[derive(Debug)]
pub(crate) enum GenState {
    /// Never resumed; the frame is positioned at its first instruction.
    Created(Box<Frame>),
    /// Suspended at a yield; the frame holds the saved value stack.
    Suspended(Box<Frame>),
    /// Currently executing on some call stack.
    Running,
    /// Finished, by return or by an exception escaping the body.
    Done,
}

/// A generator object: a persistent frame re-entered on each resume.
#[derive(Debug)]
pub(crate) struct Generator {
    name: String,
    state: GenState,
}

impl Generator {
    pub fn new(name: impl Into<String>, frame: Box<Frame>) -> Self {
        Self {
            name: name.into(),
            state: GenState::Created(frame),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &GenState {
        &self.state
    }

    /// Swaps the state out for `Running`, returning the previous state.
    pub fn take_state(&mut self) -> GenState {
        std::mem::replace(&mut self.state, GenState::Running)
    }

    pub fn set_state(&mut self, state: GenState) {
        self.state = state;
    }
}
