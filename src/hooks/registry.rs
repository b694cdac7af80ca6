use std::collections::{BTreeMap, HashMap};

use serde_json::json;

use crate::error::{EngineError, Result, UsageError};
use crate::input::InputTracker;
use crate::logging::{LogLevel, Logger, event_with_fields, json_kv};
use crate::runtime::context::{ControlRequests, FrameInfo};

use super::context::HookContext;
use super::{Extension, ExtensionId, HookArgs, HookKind, invoke};

#[derive(Debug, Clone, Copy)]
struct Slot {
    id: ExtensionId,
    live: bool,
}

/// Registration order for one hook kind. Removing an entry while the hook
/// is dispatching only marks the slot dead; dead slots are swept once the
/// pass is over.
#[derive(Debug, Default)]
struct HookList {
    slots: Vec<Slot>,
    dispatching: bool,
}

impl HookList {
    fn position(&self, id: ExtensionId) -> Option<usize> {
        self.slots.iter().position(|slot| slot.live && slot.id == id)
    }

    fn remove(&mut self, id: ExtensionId) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        if self.dispatching {
            self.slots[index].live = false;
        } else {
            self.slots.remove(index);
        }
        true
    }

    fn compact(&mut self) {
        self.slots.retain(|slot| slot.live);
    }

    fn live_len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.live).count()
    }
}

#[derive(Debug)]
pub struct HookFailure {
    pub extension: String,
    pub error: EngineError,
}

/// Summary of one dispatch pass.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failures: Vec<HookFailure>,
    pub requests: ControlRequests,
}

pub struct CallbackRegistry {
    extensions: BTreeMap<ExtensionId, Box<dyn Extension>>,
    hooks: HashMap<HookKind, HookList>,
    next_id: u64,
    logger: Option<Logger>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            extensions: BTreeMap::new(),
            hooks: HashMap::new(),
            next_id: 1,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Option<Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn attach(&mut self, extension: Box<dyn Extension>) -> ExtensionId {
        let id = ExtensionId(self.next_id);
        self.next_id += 1;
        self.extensions.insert(id, extension);
        id
    }

    /// Remove an extension from every hook and hand it back.
    pub fn detach(&mut self, id: ExtensionId) -> Option<Box<dyn Extension>> {
        for list in self.hooks.values_mut() {
            while list.remove(id) {}
        }
        self.extensions.remove(&id)
    }

    pub fn add(&mut self, kind: HookKind, id: ExtensionId) -> std::result::Result<(), UsageError> {
        let extension = self
            .extensions
            .get(&id)
            .ok_or(UsageError::UnknownExtension(id))?;
        if !extension.provides(kind) {
            return Err(UsageError::MissingCapability { kind, id });
        }
        let list = self.hooks.entry(kind).or_default();
        if list.position(id).is_some() {
            return Err(UsageError::DuplicateHook { kind, id });
        }
        list.slots.push(Slot { id, live: true });
        Ok(())
    }

    /// Register an extension for every hook it declares.
    pub fn add_all(&mut self, id: ExtensionId) -> std::result::Result<(), UsageError> {
        let kinds: Vec<HookKind> = self
            .extensions
            .get(&id)
            .ok_or(UsageError::UnknownExtension(id))?
            .capabilities()
            .to_vec();
        for (done, kind) in kinds.iter().enumerate() {
            if let Err(error) = self.add(*kind, id) {
                for added in &kinds[..done] {
                    self.remove(*added, id);
                }
                return Err(error);
            }
        }
        Ok(())
    }

    /// Remove the first registration of `id` for `kind`.
    pub fn remove(&mut self, kind: HookKind, id: ExtensionId) -> bool {
        self.hooks
            .get_mut(&kind)
            .map(|list| list.remove(id))
            .unwrap_or(false)
    }

    pub fn contains(&self, kind: HookKind, id: ExtensionId) -> bool {
        self.hooks
            .get(&kind)
            .map(|list| list.position(id).is_some())
            .unwrap_or(false)
    }

    pub fn len(&self, kind: HookKind) -> usize {
        self.hooks.get(&kind).map(HookList::live_len).unwrap_or(0)
    }

    pub fn is_dispatching(&self, kind: HookKind) -> bool {
        self.hooks
            .get(&kind)
            .map(|list| list.dispatching)
            .unwrap_or(false)
    }

    pub fn extension_count(&self) -> usize {
        self.extensions.len()
    }

    pub fn extension_name(&self, id: ExtensionId) -> Option<&str> {
        self.extensions.get(&id).map(|extension| extension.name())
    }

    /// Invoke every extension registered for `kind`, in registration order.
    ///
    /// Entries added during the pass are not visited until the next one.
    /// A fatal error stops the pass and is returned; any other error is
    /// logged, recorded in the report, and the pass carries on.
    pub fn dispatch(
        &mut self,
        kind: HookKind,
        args: HookArgs<'_>,
        info: FrameInfo,
        input: &InputTracker,
    ) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();
        let count = match self.hooks.get_mut(&kind) {
            Some(list) if !list.slots.is_empty() => {
                list.dispatching = true;
                list.slots.len()
            }
            _ => return Ok(report),
        };

        let mut fatal = None;
        for index in 0..count {
            let id = match self.hooks.get(&kind).and_then(|list| list.slots.get(index)) {
                Some(slot) if slot.live => slot.id,
                _ => continue,
            };
            let Some(extension) = self.extensions.get_mut(&id) else {
                continue;
            };

            let mut ctx = HookContext::new(id, kind, info, input);
            let result = invoke(extension.as_mut(), kind, args, &mut ctx);
            let name = extension.name().to_string();
            report.invoked += 1;

            let outcome = ctx.into_outcome();
            report.requests.merge(outcome.requests);
            for (removed_kind, removed_id) in outcome.removals {
                self.remove(removed_kind, removed_id);
            }
            for detached in outcome.detached {
                self.detach(detached);
            }

            if let Err(error) = result {
                if error.is_fatal() {
                    fatal = Some(error);
                    break;
                }
                self.log_failure(kind, &name, &error);
                report.failures.push(HookFailure {
                    extension: name,
                    error,
                });
            }
        }

        if let Some(list) = self.hooks.get_mut(&kind) {
            list.dispatching = false;
            list.compact();
        }

        match fatal {
            Some(error) => Err(error),
            None => Ok(report),
        }
    }

    fn log_failure(&self, kind: HookKind, extension: &str, error: &EngineError) {
        if let Some(logger) = self.logger.as_ref() {
            let event = event_with_fields(
                LogLevel::Warn,
                "sketch::runtime.hooks",
                "hook_failed",
                [
                    json_kv("hook", json!(kind.as_str())),
                    json_kv("extension", json!(extension)),
                    json_kv("error", json!(error.to_string())),
                ],
            );
            let _ = logger.log_event(event);
        }
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}
