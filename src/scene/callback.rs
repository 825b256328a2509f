//! Callback Dispatcher: resolves and invokes script hooks by name.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::io::SharedIo;
use crate::{EraError, Result};

/// What the dispatcher needs from a script engine.
pub trait Scripter {
    /// Call a global function without arguments.
    ///
    /// Fails with [`EraError::FunctionNotFound`] when it is not defined.
    fn call_by_name(&self, name: &str) -> Result<()>;

    /// Call a global function with one integer, reading back a boolean.
    fn call_bool_arg_int_by_name(&self, name: &str, arg: i64) -> Result<bool>;

    /// Whether a global function with this name is defined.
    fn has_value(&self, name: &str) -> bool;
}

/// Role of a script hook, encoded in its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Replaces a scene's whole flow.
    Scene,
    /// Optional notification. Never controls flow.
    Event,
    /// Overrides one sub-step of a builtin flow.
    Replace,
    /// Mandatory extension point. A missing one is reported as a caution.
    User,
}

impl HookKind {
    pub fn prefix(self) -> &'static str {
        match self {
            HookKind::Scene => "scene",
            HookKind::Event => "event",
            HookKind::Replace => "replace",
            HookKind::User => "user",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Script function name of a hook.
///
/// `Scene` hooks ignore `detail`: `title` gives `title_scene`. The others join
/// all three parts, e.g. `shop_user_buy`.
pub fn hook_name(scene: &str, kind: HookKind, detail: &str) -> String {
    match kind {
        HookKind::Scene => format!("{scene}_scene"),
        _ => format!("{scene}_{}_{detail}", kind.prefix()),
    }
}

/// A hook a scene may dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookSpec {
    pub kind: HookKind,
    pub detail: &'static str,
}

impl HookSpec {
    pub const fn new(kind: HookKind, detail: &'static str) -> Self {
        Self { kind, detail }
    }

    pub fn name(&self, scene: &str) -> String {
        hook_name(scene, self.kind, self.detail)
    }
}

/// Which known hooks the loaded scripts define.
///
/// Filled once after scripts are loaded. Names the table has never seen fall
/// back to asking the scripter.
#[derive(Debug, Default)]
pub struct HookTable {
    defined: HashMap<String, bool>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record, for each name, whether the scripter defines it.
    pub fn populate<I>(&mut self, scripter: &dyn Scripter, names: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.defined.clear();
        for name in names {
            let defined = scripter.has_value(&name);
            if defined {
                trace!("hook {} is defined", name);
            }
            self.defined.insert(name, defined);
        }
    }

    /// `None` when the name was not part of the last population.
    pub fn lookup(&self, name: &str) -> Option<bool> {
        self.defined.get(name).copied()
    }

    /// Drop a stale entry so later lookups ask the scripter again.
    pub fn forget(&mut self, name: &str) {
        self.defined.remove(name);
    }

    pub fn defined_count(&self) -> usize {
        self.defined.values().filter(|d| **d).count()
    }

    pub fn len(&self) -> usize {
        self.defined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defined.is_empty()
    }
}

/// Invokes script hooks under one of four policies.
///
/// | policy    | undefined hook            |
/// |-----------|---------------------------|
/// | `maybe`   | no-op                     |
/// | `must`    | `FunctionNotFound`        |
/// | `check`   | reports "not called"      |
/// | `caution` | prints a caution          |
#[derive(Clone)]
pub struct CallbackDispatcher {
    scripter: Rc<dyn Scripter>,
    io: SharedIo,
    hooks: Rc<RefCell<HookTable>>,
}

impl CallbackDispatcher {
    pub fn new(scripter: Rc<dyn Scripter>, io: SharedIo) -> Self {
        Self {
            scripter,
            io,
            hooks: Rc::new(RefCell::new(HookTable::new())),
        }
    }

    /// Re-read which of `names` the scripts define.
    pub fn refresh_hooks<I>(&self, names: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut hooks = self.hooks.borrow_mut();
        hooks.populate(self.scripter.as_ref(), names);
        debug!(
            "hook table: {} of {} known hooks defined",
            hooks.defined_count(),
            hooks.len()
        );
    }

    pub fn is_defined(&self, name: &str) -> bool {
        let known = self.hooks.borrow().lookup(name);
        known.unwrap_or_else(|| self.scripter.has_value(name))
    }

    /// Call `name` when defined; `None` means it was not.
    ///
    /// A hook the scripts removed after the table was filled counts as
    /// undefined, and its entry is forgotten.
    fn call<T>(&self, name: &str, call: impl FnOnce() -> Result<T>) -> Result<Option<T>> {
        if !self.is_defined(name) {
            return Ok(None);
        }
        match call() {
            Ok(value) => Ok(Some(value)),
            Err(EraError::FunctionNotFound(missing)) if missing == name => {
                debug!("hook {} was removed at runtime", name);
                self.hooks.borrow_mut().forget(name);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn call_unit(&self, name: &str) -> Result<Option<()>> {
        self.call(name, || self.scripter.call_by_name(name))
    }

    fn call_bool(&self, name: &str, arg: i64) -> Result<Option<bool>> {
        self.call(name, || self.scripter.call_bool_arg_int_by_name(name, arg))
    }

    fn caution(&self, name: &str) -> Result<()> {
        self.io
            .borrow_mut()
            .print_caution(&format!("script function {name} is not defined"))
    }

    pub fn maybe_call(&self, name: &str) -> Result<()> {
        self.call_unit(name).map(|_| ())
    }

    pub fn must_call(&self, name: &str) -> Result<()> {
        self.call_unit(name)?
            .ok_or_else(|| EraError::FunctionNotFound(name.to_string()))
    }

    /// Returns whether the hook was called.
    pub fn check_call(&self, name: &str) -> Result<bool> {
        Ok(self.call_unit(name)?.is_some())
    }

    pub fn caution_call(&self, name: &str) -> Result<()> {
        match self.call_unit(name)? {
            Some(()) => Ok(()),
            None => self.caution(name),
        }
    }

    pub fn maybe_call_bool_arg_int(&self, name: &str, arg: i64) -> Result<bool> {
        Ok(self.call_bool(name, arg)?.unwrap_or(false))
    }

    pub fn must_call_bool_arg_int(&self, name: &str, arg: i64) -> Result<bool> {
        self.call_bool(name, arg)?
            .ok_or_else(|| EraError::FunctionNotFound(name.to_string()))
    }

    /// Returns `(called, result)`.
    pub fn check_call_bool_arg_int(&self, name: &str, arg: i64) -> Result<(bool, bool)> {
        Ok(match self.call_bool(name, arg)? {
            Some(ret) => (true, ret),
            None => (false, false),
        })
    }

    /// A missing hook yields `false` after the caution is printed.
    pub fn caution_call_bool_arg_int(&self, name: &str, arg: i64) -> Result<bool> {
        match self.call_bool(name, arg)? {
            Some(ret) => Ok(ret),
            None => self.caution(name).map(|_| false),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::io::{shared, BufferIo, GameIo};
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    /// Scripter backed by Rust closures.
    #[derive(Default)]
    pub(crate) struct FakeScripter {
        pub(crate) functions: HashMap<String, Box<dyn Fn(i64) -> Result<bool>>>,
        pub(crate) calls: RefCell<Vec<(String, Option<i64>)>>,
        pub(crate) lookups: Cell<usize>,
        pub(crate) removed: RefCell<Vec<String>>,
    }

    impl FakeScripter {
        pub(crate) fn define(
            mut self,
            name: &str,
            f: impl Fn(i64) -> Result<bool> + 'static,
        ) -> Self {
            self.functions.insert(name.to_string(), Box::new(f));
            self
        }

        /// Remove a function without telling the hook table.
        pub(crate) fn undefine(&self, name: &str) {
            self.removed.borrow_mut().push(name.to_string());
        }

        fn get(&self, name: &str) -> Result<&dyn Fn(i64) -> Result<bool>> {
            if self.removed.borrow().iter().any(|n| n == name) {
                return Err(EraError::FunctionNotFound(name.to_string()));
            }
            self.functions
                .get(name)
                .map(|f| f.as_ref())
                .ok_or_else(|| EraError::FunctionNotFound(name.to_string()))
        }

        pub(crate) fn called(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|(n, _)| n.clone()).collect()
        }
    }

    impl Scripter for FakeScripter {
        fn call_by_name(&self, name: &str) -> Result<()> {
            let f = self.get(name)?;
            self.calls.borrow_mut().push((name.to_string(), None));
            f(0).map(|_| ())
        }

        fn call_bool_arg_int_by_name(&self, name: &str, arg: i64) -> Result<bool> {
            let f = self.get(name)?;
            self.calls.borrow_mut().push((name.to_string(), Some(arg)));
            f(arg)
        }

        fn has_value(&self, name: &str) -> bool {
            self.lookups.set(self.lookups.get() + 1);
            self.get(name).is_ok()
        }
    }

    fn dispatcher(scripter: FakeScripter) -> (CallbackDispatcher, Rc<FakeScripter>, BufferIo) {
        let scripter = Rc::new(scripter);
        let io = BufferIo::new();
        let dispatcher = CallbackDispatcher::new(scripter.clone(), shared(io.clone()));
        (dispatcher, scripter, io)
    }

    #[test]
    fn test_hook_names() {
        assert_eq!(hook_name("title", HookKind::Scene, ""), "title_scene");
        assert_eq!(hook_name("shop", HookKind::User, "buy"), "shop_user_buy");
        assert_eq!(
            hook_name("base", HookKind::Replace, "command"),
            "base_replace_command"
        );
        assert_eq!(
            HookSpec::new(HookKind::Event, "start").name("train_end"),
            "train_end_event_start"
        );
    }

    #[test]
    fn test_maybe_call_undefined_is_noop() {
        let (dispatcher, scripter, io) = dispatcher(FakeScripter::default());
        dispatcher.maybe_call("title_event_start").unwrap();
        assert!(scripter.called().is_empty());
        assert!(io.cautions().is_empty());
    }

    #[test]
    fn test_must_call_undefined_fails() {
        let (dispatcher, _, _) = dispatcher(FakeScripter::default());
        match dispatcher.must_call("game_init") {
            Err(EraError::FunctionNotFound(name)) => assert_eq!(name, "game_init"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            dispatcher.must_call_bool_arg_int("game_init", 1),
            Err(EraError::FunctionNotFound(_))
        ));
    }

    #[test]
    fn test_check_call_reports_called() {
        let scripter = FakeScripter::default().define("base_scene", |_| Ok(true));
        let (dispatcher, scripter, _) = dispatcher(scripter);

        assert!(dispatcher.check_call("base_scene").unwrap());
        assert!(!dispatcher.check_call("shop_scene").unwrap());
        assert_eq!(scripter.called(), vec!["base_scene"]);
    }

    #[test]
    fn test_caution_call_missing_fn() {
        let (dispatcher, scripter, io) = dispatcher(FakeScripter::default());
        dispatcher.caution_call("missing_fn").unwrap();

        let cautions = io.cautions();
        assert_eq!(cautions.len(), 1);
        assert!(cautions[0].contains("missing_fn"));
        assert!(scripter.called().is_empty());
    }

    struct BrokenIo;

    impl GameIo for BrokenIo {
        fn print(&mut self, _text: &str) -> Result<()> {
            Ok(())
        }

        fn print_caution(&mut self, _text: &str) -> Result<()> {
            Err(EraError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "pipe closed",
            )))
        }

        fn input_line(&mut self, _prompt: Option<&str>) -> Result<String> {
            Err(EraError::InputClosed)
        }
    }

    #[test]
    fn test_caution_call_returns_print_error() {
        let dispatcher = CallbackDispatcher::new(Rc::new(FakeScripter::default()), shared(BrokenIo));
        assert!(matches!(
            dispatcher.caution_call("missing_fn"),
            Err(EraError::Io(_))
        ));
        assert!(matches!(
            dispatcher.caution_call_bool_arg_int("missing_fn", 3),
            Err(EraError::Io(_))
        ));
    }

    #[test]
    fn test_bool_arg_int_variants() {
        let scripter = FakeScripter::default().define("shop_user_buy", |item| Ok(item == 2));
        let (dispatcher, scripter, io) = dispatcher(scripter);

        assert!(dispatcher.maybe_call_bool_arg_int("shop_user_buy", 2).unwrap());
        assert!(!dispatcher.must_call_bool_arg_int("shop_user_buy", 1).unwrap());
        assert_eq!(
            dispatcher.check_call_bool_arg_int("shop_user_buy", 2).unwrap(),
            (true, true)
        );
        assert_eq!(
            dispatcher.check_call_bool_arg_int("shop_user_sell", 2).unwrap(),
            (false, false)
        );
        assert!(!dispatcher.maybe_call_bool_arg_int("shop_user_sell", 2).unwrap());
        assert!(!dispatcher.caution_call_bool_arg_int("shop_user_sell", 2).unwrap());
        assert_eq!(io.cautions().len(), 1);

        let args: Vec<_> = scripter.calls.borrow().iter().map(|(_, a)| *a).collect();
        assert_eq!(args, vec![Some(2), Some(1), Some(2)]);
    }

    #[test]
    fn test_errors_pass_through_unchanged() {
        let scripter = FakeScripter::default()
            .define("base_user_show_status", |_| Err(EraError::SceneNext))
            .define("train_user_command", |_| Err(EraError::Quit));
        let (dispatcher, _, _) = dispatcher(scripter);

        assert!(matches!(
            dispatcher.caution_call("base_user_show_status"),
            Err(EraError::SceneNext)
        ));
        assert!(matches!(
            dispatcher.check_call_bool_arg_int("train_user_command", 1),
            Err(EraError::Quit)
        ));
    }

    #[test]
    fn test_hook_table_answers_known_names() {
        let scripter = FakeScripter::default().define("title_scene", |_| Ok(true));
        let (dispatcher, scripter, _) = dispatcher(scripter);

        dispatcher.refresh_hooks(["title_scene".to_string(), "shop_scene".to_string()]);
        let after_populate = scripter.lookups.get();
        assert_eq!(after_populate, 2);

        assert!(dispatcher.is_defined("title_scene"));
        assert!(!dispatcher.is_defined("shop_scene"));
        assert_eq!(scripter.lookups.get(), after_populate);

        // Unknown names still reach the scripter.
        assert!(!dispatcher.is_defined("custom_hook"));
        assert_eq!(scripter.lookups.get(), after_populate + 1);
    }

    #[test]
    fn test_hook_removed_after_refresh() {
        let scripter = FakeScripter::default()
            .define("title_event_start", |_| Ok(true))
            .define("shop_user_buy", |_| Ok(true));
        let (dispatcher, scripter, io) = dispatcher(scripter);
        dispatcher.refresh_hooks(["title_event_start".to_string(), "shop_user_buy".to_string()]);

        scripter.undefine("title_event_start");
        scripter.undefine("shop_user_buy");
        assert!(dispatcher.is_defined("title_event_start"));

        dispatcher.maybe_call("title_event_start").unwrap();
        assert!(!dispatcher.check_call("title_event_start").unwrap());
        assert_eq!(
            dispatcher.check_call_bool_arg_int("shop_user_buy", 1).unwrap(),
            (false, false)
        );
        assert!(!dispatcher.caution_call_bool_arg_int("shop_user_buy", 1).unwrap());
        assert_eq!(io.cautions().len(), 1);
        assert!(matches!(
            dispatcher.must_call("title_event_start"),
            Err(EraError::FunctionNotFound(name)) if name == "title_event_start"
        ));

        // The stale entry is gone; the scripter is asked directly now.
        assert!(!dispatcher.is_defined("title_event_start"));
        assert!(scripter.called().is_empty());
    }

    #[test]
    fn test_not_found_from_inside_hook_propagates() {
        let scripter = FakeScripter::default()
            .define("base_scene", |_| Err(EraError::FunctionNotFound("helper".to_string())));
        let (dispatcher, _, _) = dispatcher(scripter);

        assert!(matches!(
            dispatcher.maybe_call("base_scene"),
            Err(EraError::FunctionNotFound(name)) if name == "helper"
        ));
    }
}
