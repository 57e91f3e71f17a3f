//! Interaction mode gates.
//!
//! Two small automata decide whether viewer-originated `send-input` and
//! `raycast` commands are legal *at submission time*. The server keeps its
//! own mirror of these gates and drops commands that arrive outside a mode,
//! so both sides agree even when commands cross on the wire.

/// Text-input mode.
///
/// Opened by `request-input`, closed by `cancel-input` or by submitting.
/// Reopening replaces the prompt but never clears the viewer-held draft;
/// the draft belongs to the user, not the server.
#[derive(Debug, Default, Clone)]
pub struct TextInputGate {
    active: bool,
    prompt: Option<String>,
    draft: String,
}

impl TextInputGate {
    /// Server opened (or re-opened) the mode.
    pub fn open(&mut self, prompt: Option<String>) {
        self.active = true;
        self.prompt = prompt;
    }

    /// Server cancelled the mode. The draft survives for the next round.
    pub fn cancel(&mut self) {
        self.active = false;
        self.prompt = None;
    }

    /// Viewer submits. Returns `true` when the mode was open; submitting
    /// closes it and consumes the draft.
    pub fn submit(&mut self) -> bool {
        let was_active = self.active;
        if was_active {
            self.active = false;
            self.prompt = None;
            self.draft.clear();
        }
        was_active
    }

    /// Whether the mode is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Current prompt, when open.
    #[must_use]
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    /// The viewer-held draft.
    #[must_use]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Replace the draft (user typed).
    pub fn set_draft(&mut self, draft: String) {
        self.draft = draft;
    }
}

/// Raycast mode.
///
/// Opened by `raycast-request` (idempotent), closed by `raycast-cancel`
/// from either side or by firing a ray.
#[derive(Debug, Default, Clone)]
pub struct RaycastGate {
    active: bool,
}

impl RaycastGate {
    /// Server requested a ray.
    pub fn open(&mut self) {
        self.active = true;
    }

    /// Either side cancelled the mode.
    pub fn cancel(&mut self) {
        self.active = false;
    }

    /// Viewer fires. Returns `true` when the mode was open; firing closes
    /// it, so a second ray without a new request is invalid.
    pub fn fire(&mut self) -> bool {
        std::mem::take(&mut self.active)
    }

    /// Whether the mode is open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }
}
