use alloc::{collections::BTreeMap, vec, vec::Vec};
use parking_lot::{lock_api::GetThreadId as _, Condvar, Mutex, RawThreadId};

use crate::{any::AnyInstance, errors::ResolveErrorKind};

type ThreadId = usize;
/// Caching scope address and key
type Slot = (usize, &'static str);

#[inline]
fn current_thread() -> ThreadId {
    RawThreadId.nonzero_thread_id().get()
}

#[derive(Default)]
struct ConstructionState {
    /// Keys under construction by each thread, outermost first
    stacks: BTreeMap<ThreadId, Vec<&'static str>>,
    /// Cache entries being built and the thread building them
    building: BTreeMap<Slot, ThreadId>,
    /// Slot each blocked thread waits for
    waiting: BTreeMap<ThreadId, Slot>,
}

impl ConstructionState {
    fn cycle_from_stack(&self, thread: ThreadId, key: &'static str) -> ResolveErrorKind {
        let stack = self.stacks.get(&thread).map(Vec::as_slice).unwrap_or_default();
        let mut path = match stack.iter().position(|in_flight| *in_flight == key) {
            Some(start) => stack[start..].to_vec(),
            None => vec![key],
        };
        path.push(key);
        ResolveErrorKind::CircularDependency { path }
    }

    /// Follows the wait chain starting at the builder of `slot`.
    /// Returns the cycle path if it leads back to `thread`.
    fn wait_cycle(&self, thread: ThreadId, slot: Slot) -> Option<ResolveErrorKind> {
        let mut path = vec![slot.1];
        let mut builder = *self.building.get(&slot)?;
        for _ in 0..=self.waiting.len() {
            if builder == thread {
                path.push(slot.1);
                return Some(ResolveErrorKind::CircularDependency { path });
            }
            let awaited = self.waiting.get(&builder)?;
            path.push(awaited.1);
            builder = *self.building.get(awaited)?;
        }
        None
    }
}

pub(crate) enum Claim<'a> {
    Cached(AnyInstance),
    Build(ClaimGuard<'a>),
}

/// Construction bookkeeping shared by every scope of a tree.
///
/// Tracks keys under construction per thread, so re-entering a key on the same thread is
/// reported as a cycle whatever path led there. A cache entry is built by one thread at a
/// time. Others wait for it, unless waiting would close a loop of threads waiting on each
/// other, which is a cycle too.
#[derive(Default)]
pub(crate) struct Constructions {
    state: Mutex<ConstructionState>,
    built: Condvar,
}

impl Constructions {
    /// Pushes the key on the current thread's stack, failing if it's already there
    pub(crate) fn enter(&self, key: &'static str) -> Result<EnterGuard<'_>, ResolveErrorKind> {
        let thread = current_thread();
        let mut state = self.state.lock();
        if state.stacks.get(&thread).is_some_and(|stack| stack.contains(&key)) {
            return Err(state.cycle_from_stack(thread, key));
        }
        state.stacks.entry(thread).or_default().push(key);
        Ok(EnterGuard { constructions: self, thread })
    }

    /// Returns the cached instance, or the right to build it once no other thread is building it.
    /// `cached` runs under the bookkeeping lock.
    pub(crate) fn claim(
        &self,
        slot: Slot,
        mut cached: impl FnMut() -> Result<Option<AnyInstance>, ResolveErrorKind>,
    ) -> Result<Claim<'_>, ResolveErrorKind> {
        let thread = current_thread();
        let mut state = self.state.lock();
        loop {
            if let Some(instance) = cached()? {
                return Ok(Claim::Cached(instance));
            }

            match state.building.get(&slot).copied() {
                None => {
                    state.building.insert(slot, thread);
                    return Ok(Claim::Build(ClaimGuard { constructions: self, slot }));
                }
                Some(builder) if builder == thread => return Err(state.cycle_from_stack(thread, slot.1)),
                Some(_) => {
                    if let Some(err) = state.wait_cycle(thread, slot) {
                        return Err(err);
                    }
                    state.waiting.insert(thread, slot);
                    self.built.wait(&mut state);
                    state.waiting.remove(&thread);
                }
            }
        }
    }
}

pub(crate) struct EnterGuard<'a> {
    constructions: &'a Constructions,
    thread: ThreadId,
}

impl Drop for EnterGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.constructions.state.lock();
        if let Some(stack) = state.stacks.get_mut(&self.thread) {
            stack.pop();
            if stack.is_empty() {
                state.stacks.remove(&self.thread);
            }
        }
    }
}

/// Released once the instance is cached or its construction failed
pub(crate) struct ClaimGuard<'a> {
    constructions: &'a Constructions,
    slot: Slot,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.constructions.state.lock().building.remove(&self.slot);
        self.constructions.built.notify_all();
    }
}
