//! Per execution unit tenant context.
//!
//! Each logical unit of work (request, task, job) owns one [`ContextStack`].
//! Stacks live in a tokio task-local slot, so two units interleaved on the
//! same worker thread never see each other's tenant. A unit is established
//! with [`TenantContext::run_unit`] (or [`TenantContext::run_unit_sync`] for
//! synchronous code), and [`TenantContext::scope`] pushes a tenant for the
//! duration of a future, popping it on completion, error or cancellation.

use crate::errors::ContextError;
use crate::metrics_defs::{CONTEXT_POP, CONTEXT_PUSH, CONTEXT_STACK_MISUSE};
use crate::types::TenantDescriptor;
use shared::counter;
use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

tokio::task_local! {
    static UNIT_STACK: RefCell<ContextStack>;
}

// Process-wide so a token never matches a frame pushed by another unit.
static NEXT_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Identifies one push. Handed back by `push` and checked when a guard pops.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackToken {
    depth: usize,
    serial: u64,
}

impl StackToken {
    /// Stack depth right after the push, the base not counted.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[derive(Clone, Debug)]
struct Frame {
    token: StackToken,
    descriptor: Arc<TenantDescriptor>,
}

/// Ordered stack of active tenants for one unit of execution. The base
/// descriptor sits beneath the bottom and is never popped.
#[derive(Debug)]
pub struct ContextStack {
    base: Arc<TenantDescriptor>,
    frames: Vec<Frame>,
    // Frames below this index were inherited from a parent stack by `fork`
    // and belong to it.
    floor: usize,
}

impl ContextStack {
    pub fn new(base: Arc<TenantDescriptor>) -> Self {
        ContextStack {
            base,
            frames: Vec::new(),
            floor: 0,
        }
    }

    /// A child stack that sees every tenant active here but can only pop
    /// what is pushed onto it afterwards.
    pub fn fork(&self) -> Self {
        ContextStack {
            base: self.base.clone(),
            frames: self.frames.clone(),
            floor: self.frames.len(),
        }
    }

    pub fn push(&mut self, descriptor: Arc<TenantDescriptor>) -> StackToken {
        let token = StackToken {
            depth: self.frames.len() + 1,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
        };
        self.frames.push(Frame { token, descriptor });
        token
    }

    pub fn pop(&mut self) -> Result<Arc<TenantDescriptor>, ContextError> {
        if self.frames.len() <= self.floor {
            return Err(ContextError::PopBeyondBase);
        }
        self.frames
            .pop()
            .map(|frame| frame.descriptor)
            .ok_or(ContextError::PopBeyondBase)
    }

    /// Pops the frame created by `token`, which must be on top.
    ///
    /// When it is not, every frame above it is discarded as well so the
    /// stack is back where it was before the matching push, and the
    /// mismatch is reported. A token pushed on another stack, or inherited
    /// from a parent, leaves the stack untouched.
    pub fn pop_token(&mut self, token: StackToken) -> Result<Arc<TenantDescriptor>, ContextError> {
        let owned = &self.frames[self.floor..];
        let top = owned.last().map(|frame| frame.token);
        if top == Some(token) {
            return self.pop();
        }

        if let Some(position) = owned.iter().position(|frame| frame.token == token) {
            self.frames.truncate(self.floor + position);
        }
        Err(ContextError::UnbalancedPop {
            expected: token,
            actual: top,
        })
    }

    /// The active tenant, or the base when nothing was pushed.
    pub fn current(&self) -> &Arc<TenantDescriptor> {
        self.pushed().unwrap_or(&self.base)
    }

    /// The active tenant only if one was pushed.
    pub fn pushed(&self) -> Option<&Arc<TenantDescriptor>> {
        self.frames.last().map(|frame| &frame.descriptor)
    }

    pub fn base(&self) -> &Arc<TenantDescriptor> {
        &self.base
    }

    /// Number of pushed frames, excluding the base.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

fn report_misuse(err: &ContextError) {
    counter!(CONTEXT_STACK_MISUSE).increment(1);
    tracing::error!(error = %err, "tenant context stack misuse");
}

/// Handle to the task-local context stacks.
///
/// Cheap to clone. Holds the base tenant seeded into every new unit and the
/// strictness setting for units where nothing has been pushed.
#[derive(Clone, Debug)]
pub struct TenantContext {
    base: Arc<TenantDescriptor>,
    strict: bool,
}

impl TenantContext {
    pub fn new(base: Arc<TenantDescriptor>, strict: bool) -> Self {
        TenantContext { base, strict }
    }

    pub fn base(&self) -> &Arc<TenantDescriptor> {
        &self.base
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// True when the caller is running inside an execution unit.
    pub fn in_unit(&self) -> bool {
        UNIT_STACK.try_with(|_| ()).is_ok()
    }

    /// Runs `fut` as a new execution unit with a fresh stack holding only the
    /// base tenant.
    pub async fn run_unit<F: Future>(&self, fut: F) -> F::Output {
        UNIT_STACK
            .scope(RefCell::new(ContextStack::new(self.base.clone())), fut)
            .await
    }

    /// Synchronous counterpart of [`TenantContext::run_unit`], for units that
    /// run on a plain or blocking thread.
    pub fn run_unit_sync<R, F: FnOnce() -> R>(&self, f: F) -> R {
        UNIT_STACK.sync_scope(RefCell::new(ContextStack::new(self.base.clone())), f)
    }

    pub fn push(&self, descriptor: Arc<TenantDescriptor>) -> Result<StackToken, ContextError> {
        let tenant = descriptor.id().to_string();
        let token = UNIT_STACK
            .try_with(|stack| stack.borrow_mut().push(descriptor))
            .map_err(|_| ContextError::NoExecutionUnit)
            .inspect_err(report_misuse)?;

        counter!(CONTEXT_PUSH).increment(1);
        tracing::trace!(
            tenant = %tenant,
            depth = token.depth,
            serial = token.serial,
            "pushed tenant context"
        );
        Ok(token)
    }

    pub fn pop(&self) -> Result<Arc<TenantDescriptor>, ContextError> {
        self.pop_with(|stack| stack.pop())
    }

    fn pop_token(&self, token: StackToken) -> Result<Arc<TenantDescriptor>, ContextError> {
        self.pop_with(|stack| stack.pop_token(token))
    }

    fn pop_with<F>(&self, f: F) -> Result<Arc<TenantDescriptor>, ContextError>
    where
        F: FnOnce(&mut ContextStack) -> Result<Arc<TenantDescriptor>, ContextError>,
    {
        let descriptor = UNIT_STACK
            .try_with(|stack| f(&mut stack.borrow_mut()))
            .unwrap_or(Err(ContextError::NoExecutionUnit))
            .inspect_err(report_misuse)?;

        counter!(CONTEXT_POP).increment(1);
        tracing::trace!(tenant = %descriptor.id(), "popped tenant context");
        Ok(descriptor)
    }

    /// The active tenant of the current unit.
    ///
    /// Falls back to the base tenant when nothing was pushed (or no unit is
    /// active), unless strict mode is enabled, in which case that is an error.
    pub fn current(&self) -> Result<Arc<TenantDescriptor>, ContextError> {
        let pushed = UNIT_STACK
            .try_with(|stack| stack.borrow().pushed().cloned())
            .ok()
            .flatten();

        match pushed {
            Some(descriptor) => Ok(descriptor),
            None if self.strict => Err(ContextError::NoActiveTenant),
            None => Ok(self.base.clone()),
        }
    }

    /// Pushes `descriptor` and returns a guard that pops it when dropped.
    pub fn enter(&self, descriptor: Arc<TenantDescriptor>) -> Result<TenantGuard, ContextError> {
        let token = self.push(descriptor)?;
        Ok(TenantGuard {
            context: self.clone(),
            token,
        })
    }

    /// Runs `fut` with `descriptor` as the active tenant.
    ///
    /// Inside an existing unit `fut` runs on a fork of that unit's stack, so
    /// it still sees the enclosing tenants while sibling scopes polled
    /// concurrently in the same unit cannot observe or pop each other's
    /// frames. Outside any unit a new one is created. The tenant is popped
    /// whether `fut` completes, panics or is dropped before completion.
    pub async fn scope<F: Future>(
        &self,
        descriptor: Arc<TenantDescriptor>,
        fut: F,
    ) -> Result<F::Output, ContextError> {
        let scoped = async move {
            let _guard = self.enter(descriptor)?;
            Ok::<_, ContextError>(fut.await)
        };

        let forked = UNIT_STACK.try_with(|stack| stack.borrow().fork()).ok();
        match forked {
            Some(stack) => UNIT_STACK.scope(RefCell::new(stack), scoped).await,
            None => self.run_unit(scoped).await,
        }
    }
}

/// Pops its tenant on drop. Misuse detected at that point can only be
/// reported, never returned.
#[must_use = "the tenant is popped as soon as the guard is dropped"]
#[derive(Debug)]
pub struct TenantGuard {
    context: TenantContext,
    token: StackToken,
}

impl TenantGuard {
    pub fn token(&self) -> StackToken {
        self.token
    }
}

impl Drop for TenantGuard {
    fn drop(&mut self) {
        // Already reported by pop_with.
        let _ = self.context.pop_token(self.token);
    }
}
