//! Rate limiting logic and state management.

mod block;
mod clock;
mod counter;
mod fallback;
mod key;
mod limiter;
mod local;
mod policy;
mod remote;
mod store;

pub use block::BlockList;
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::CounterEntry;
pub use fallback::FallbackStore;
pub use key::{BlockKey, CounterKey};
pub use limiter::{BoundPolicy, Decision, RateLimiter};
pub use local::{LocalStore, SweepHandle};
pub use policy::{IdentifierSource, Policy, PolicyName, API, CHAT, OTP_SEND, OTP_VERIFY, STRICT};
pub use remote::RemoteStore;
pub use store::{CounterStore, WindowCount};
