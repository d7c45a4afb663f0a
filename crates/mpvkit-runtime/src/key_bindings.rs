//! Key bindings and client-message handlers
//!
//! Each key definition gets its own input section named after a hash of the
//! keydef. Command bindings put the command straight into the section; callback
//! bindings bind the key to `script-binding <client>/<section>`, which makes the
//! engine send a `key-binding` client message that the event loop routes back
//! to the registered handler.

use crate::player::{Player, Shared};
use crate::registry::MessageHandler;
use dashmap::DashMap;
use mpvkit_core::{ErrorCode, MpvError, MpvResult};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// First argument of the client message the engine sends for bound keys
pub(crate) const KEY_BINDING_MESSAGE: &str = "key-binding";

const SECTION_FLAGS: &str = "allow-hide-cursor+allow-vo-dragging";

pub type KeyHandler = Arc<dyn Fn(&KeyEvent) -> anyhow::Result<()> + Send + Sync>;

// ----------------------------------------------------------------------------
// Types
// ----------------------------------------------------------------------------

/// One key state change delivered to a callback binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// State string from the engine: `d-` down, `u-` up, `p-` press, `r-` repeat
    pub state: String,
    pub key_name: Option<String>,
    /// Text the key produces, when it is a single character
    pub key_char: Option<String>,
}

impl KeyEvent {
    pub(crate) fn from_args(args: &[String]) -> Self {
        let non_empty = |i: usize| args.get(i).filter(|s| !s.is_empty()).cloned();
        Self {
            state: args.first().cloned().unwrap_or_default(),
            key_name: non_empty(1),
            key_char: non_empty(2),
        }
    }

    /// True for key-down and full press states
    pub fn is_press(&self) -> bool {
        matches!(self.state.chars().next(), Some('d') | Some('p'))
    }
}

/// What a bound key does
#[derive(Clone)]
pub enum KeyAction {
    Callback(KeyHandler),
    /// Engine input command, e.g. `cycle pause`
    Command(String),
}

impl KeyAction {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&KeyEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        KeyAction::Callback(Arc::new(f))
    }

    pub fn command<C: Into<String>>(command: C) -> Self {
        KeyAction::Command(command.into())
    }
}

/// Section mode: `force` overrides other bindings of the key, `weak` does not
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingMode {
    #[default]
    Force,
    Weak,
}

impl BindingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BindingMode::Force => "force",
            BindingMode::Weak => "weak",
        }
    }
}

/// Input section name used for `keydef`
pub fn section_name(keydef: &str) -> String {
    let digest = Sha256::digest(keydef.as_bytes());
    format!("kb_{}", &hex::encode(digest)[..16])
}

/// Accept `[Shift+][Ctrl+][Alt+][Meta+]<key>` where the key is one character
/// or a word such as `ENTER` or `MBTN_LEFT`
pub fn is_valid_keydef(keydef: &str) -> bool {
    let mut rest = keydef;
    for modifier in ["Shift+", "Ctrl+", "Alt+", "Meta+"] {
        // A lone "+" key after the modifiers must not be eaten
        if rest.len() > modifier.len() {
            if let Some(stripped) = rest.strip_prefix(modifier) {
                rest = stripped;
            }
        }
    }
    let mut chars = rest.chars();
    match (chars.next(), chars.next()) {
        (None, _) => false,
        (Some(c), None) => !c.is_whitespace(),
        _ => rest.chars().all(|c| c.is_alphanumeric() || c == '_'),
    }
}

// ----------------------------------------------------------------------------
// Binding Table
// ----------------------------------------------------------------------------

#[derive(Clone)]
pub(crate) struct KeyBindingEntry {
    pub keydef: String,
    pub handler: KeyHandler,
    pub active: Arc<AtomicBool>,
}

/// Callback bindings by section name
pub(crate) struct KeyBindingTable {
    bindings: DashMap<String, KeyBindingEntry>,
}

impl KeyBindingTable {
    pub(crate) fn new() -> Self {
        Self {
            bindings: DashMap::new(),
        }
    }

    pub(crate) fn handler(&self, section: &str) -> Option<KeyBindingEntry> {
        self.bindings.get(section).map(|entry| entry.value().clone())
    }

    fn insert(&self, section: String, keydef: &str, handler: KeyHandler) {
        let entry = KeyBindingEntry {
            keydef: keydef.to_string(),
            handler,
            active: Arc::new(AtomicBool::new(true)),
        };
        if let Some(previous) = self.bindings.insert(section, entry) {
            previous.active.store(false, Ordering::Release);
        }
    }

    fn remove(&self, section: &str) -> bool {
        match self.bindings.remove(section) {
            Some((_, entry)) => {
                entry.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub(crate) fn keydefs(&self) -> Vec<String> {
        self.bindings.iter().map(|entry| entry.keydef.clone()).collect()
    }

    pub(crate) fn clear(&self) {
        for entry in self.bindings.iter() {
            entry.active.store(false, Ordering::Release);
        }
        self.bindings.clear();
    }
}

// ----------------------------------------------------------------------------
// Groups
// ----------------------------------------------------------------------------

/// Key bindings created together by `Player::key_binding`/`on_key_press`
pub struct KeyBindingGroup {
    shared: Weak<Shared>,
    keydefs: Vec<String>,
}

impl KeyBindingGroup {
    pub fn keydefs(&self) -> &[String] {
        &self.keydefs
    }

    /// Remove every binding of the group. A no-op once the player is gone.
    pub fn unregister_all(&self) -> MpvResult<()> {
        let Some(shared) = self.shared.upgrade() else {
            return Ok(());
        };
        if !shared.is_alive() {
            return Ok(());
        }
        for keydef in &self.keydefs {
            shared.unbind_key(keydef)?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Shared-state Operations
// ----------------------------------------------------------------------------

impl Shared {
    fn run_command(&self, args: &[&str]) -> MpvResult<()> {
        self.engine
            .command(&mpvkit_core::Node::command(args))
            .map(|_| ())
            .map_err(|code| MpvError::command(args, code))
    }

    fn bind_key(&self, keydef: &str, action: KeyAction, mode: BindingMode) -> MpvResult<()> {
        if !is_valid_keydef(keydef) {
            return Err(MpvError::command(
                &["define-section", keydef],
                ErrorCode::InvalidParameter,
            ));
        }
        let section = section_name(keydef);
        let contents = match &action {
            KeyAction::Command(command) => format!("{} {}", keydef, command),
            KeyAction::Callback(_) => format!(
                "{} script-binding {}/{}",
                keydef, self.client_name, section
            ),
        };

        // The handler must be in place before the section can fire
        if let KeyAction::Callback(handler) = action {
            self.key_bindings.insert(section.clone(), keydef, handler);
        } else {
            self.key_bindings.remove(&section);
        }

        let result = self
            .run_command(&["define-section", section.as_str(), contents.as_str(), mode.as_str()])
            .and_then(|_| self.run_command(&["enable-section", section.as_str(), SECTION_FLAGS]));
        if result.is_err() {
            self.key_bindings.remove(&section);
            return result;
        }
        self.admit((), || {
            self.key_bindings.remove(&section);
        })?;
        debug!(keydef, section = %section, "Key bound");
        Ok(())
    }

    fn unbind_key(&self, keydef: &str) -> MpvResult<()> {
        let section = section_name(keydef);
        self.key_bindings.remove(&section);
        self.run_command(&["disable-section", section.as_str()])?;
        self.run_command(&["define-section", section.as_str(), ""])?;
        debug!(keydef, section = %section, "Key unbound");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Player API
// ----------------------------------------------------------------------------

impl Player {
    /// Bind `keydef` to a callback or an input command
    pub fn register_key_binding(&self, keydef: &str, action: KeyAction, mode: BindingMode) -> MpvResult<()> {
        self.shared.ensure_live()?;
        self.shared.bind_key(keydef, action, mode)
    }

    pub fn unregister_key_binding(&self, keydef: &str) -> MpvResult<()> {
        self.shared.ensure_live()?;
        self.shared.unbind_key(keydef)
    }

    /// Bind each keydef to `callback`, which sees every key state change
    pub fn key_binding<F>(&self, keydefs: &[&str], callback: F) -> MpvResult<KeyBindingGroup>
    where
        F: Fn(&KeyEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler: KeyHandler = Arc::new(callback);
        let mut group = KeyBindingGroup {
            shared: Arc::downgrade(&self.shared),
            keydefs: Vec::with_capacity(keydefs.len()),
        };
        for keydef in keydefs {
            if let Err(err) =
                self.register_key_binding(keydef, KeyAction::Callback(handler.clone()), BindingMode::Force)
            {
                group.unregister_all()?;
                return Err(err);
            }
            group.keydefs.push(keydef.to_string());
        }
        Ok(group)
    }

    /// Bind each keydef to `f`, called on key down or press only
    pub fn on_key_press<F>(&self, keydefs: &[&str], f: F) -> MpvResult<KeyBindingGroup>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.key_binding(keydefs, move |key| if key.is_press() { f() } else { Ok(()) })
    }

    /// Keydefs that currently have a callback binding
    pub fn bound_keys(&self) -> Vec<String> {
        self.shared.key_bindings.keydefs()
    }

    // Message handlers ------------------------------------------------------

    /// Route client messages whose first argument is `target` to `handler`,
    /// which receives the remaining arguments. Replaces an existing handler.
    pub fn register_message_handler<F>(&self, target: &str, handler: F) -> MpvResult<()>
    where
        F: Fn(&[String]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.ensure_live()?;
        if target == KEY_BINDING_MESSAGE {
            return Err(MpvError::config(format!(
                "message target {:?} is reserved",
                KEY_BINDING_MESSAGE
            )));
        }
        let handler: MessageHandler = Arc::new(handler);
        self.shared.registry.insert_message_handler(target, handler);
        self.shared.admit((), || {
            self.shared.registry.remove_message_handler(target);
        })
    }

    pub fn unregister_message_handler(&self, target: &str) -> MpvResult<bool> {
        self.shared.ensure_live()?;
        Ok(self.shared.registry.remove_message_handler(target))
    }
}
