//! Builder-style entry points for every operation. Subscribe and
//! unsubscribe are fire-and-forget (effects observed via listener events);
//! the rest are one-shot request/response calls.

pub mod channel_group;
pub mod grant;
pub mod history;
pub mod presence;
pub mod publish;
pub mod subscribe;
pub mod time;
