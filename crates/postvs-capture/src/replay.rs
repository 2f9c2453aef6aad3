//! Seam to the command-stream replayer.
//!
//! The replayer owns the recorded frame. The capture engine asks it to replay a range of events
//! and gets called back around every action, with the bound state at that point.

use crate::action::CapturedAction;
use crate::device::RenderState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    /// Execute everything up to the end event except the end event's own action.
    WithoutDraw,
    /// Execute the whole range, actions included.
    Full,
}

/// Everything the engine sees about one draw during replay.
#[derive(Debug, Clone, Copy)]
pub struct DrawContext<'a> {
    pub event_id: u32,
    pub action: &'a CapturedAction,
    pub state: &'a RenderState,
}

/// Hooks invoked by [`Replayer::replay_log`] around each action.
pub trait ActionCallback {
    /// Called before the draw is executed.
    fn pre_draw(&mut self, ctx: &DrawContext<'_>);

    /// Called after the draw. Returning `true` asks the replayer to re-issue it.
    fn post_draw(&mut self, _ctx: &DrawContext<'_>) -> bool {
        false
    }

    fn pre_dispatch(&mut self, _event_id: u32) {}

    fn post_dispatch(&mut self, _event_id: u32) -> bool {
        false
    }

    /// `alias` produces exactly the same output as `primary` (e.g. one draw of an expanded
    /// indirect call).
    fn alias_event(&mut self, primary: u32, alias: u32);
}

pub trait Replayer {
    /// Replays events `from..=to`, calling `callback` around each action.
    fn replay_log(
        &mut self,
        from: u32,
        to: u32,
        mode: ReplayMode,
        callback: &mut dyn ActionCallback,
    ) -> anyhow::Result<()>;

    /// The recorded action for `event_id`, if it is one.
    fn action(&self, event_id: u32) -> Option<CapturedAction>;
}
