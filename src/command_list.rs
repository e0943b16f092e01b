//! Backend-agnostic command-list recording surface.
//!
//! The binding subsystem's only output is a sequence of bind operations
//! appended to the current command list, in request order. [`CommandList`]
//! records those operations verbatim; a real backend would translate them,
//! tests inspect them directly.

use crate::descriptors::{DescriptorKind, GpuTableHandle, OfflineDescriptor, ShaderStage, TableId};
use crate::fence::{CompletionToken, FenceTimeline};

/// Lightweight command-list identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandListId(pub u64);

/// Binding operations the descriptor cache appends to a command list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindCommand {
    /// Make `view_table` and `sampler_table` the active shader-visible heaps.
    SetDescriptorHeaps {
        view_table: TableId,
        sampler_table: TableId,
    },
    /// Bind one stage's descriptor table of `kind` at its base handle.
    SetDescriptorTable {
        stage: ShaderStage,
        kind: DescriptorKind,
        table: GpuTableHandle,
    },
    /// Bind render targets (offline handles, no online heap involved).
    SetRenderTargets {
        colors: Vec<OfflineDescriptor>,
        depth: Option<OfflineDescriptor>,
    },
}

/// A recording command list plus the fence value it will signal.
///
/// The completion token is issued when the list is opened: fence values are
/// assigned in open order and lists are expected to be submitted in that same
/// order, so the token is valid (poll-only) before submission.
#[derive(Debug)]
pub struct CommandList {
    id: CommandListId,
    token: CompletionToken,
    commands: Vec<BindCommand>,
}

impl CommandList {
    /// Open a new command list on `timeline`.
    pub fn open(timeline: &FenceTimeline) -> Self {
        let token = timeline.issue_token();
        Self {
            id: CommandListId(token.value()),
            token,
            commands: Vec::new(),
        }
    }

    pub fn id(&self) -> CommandListId {
        self.id
    }

    /// Token that completes when this list's submission retires.
    pub fn completion_token(&self) -> CompletionToken {
        self.token.clone()
    }

    pub(crate) fn push(&mut self, command: BindCommand) {
        self.commands.push(command);
    }

    /// Recorded operations, in append order.
    pub fn commands(&self) -> &[BindCommand] {
        &self.commands
    }
}
