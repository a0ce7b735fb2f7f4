pub mod notification;
pub mod simulation;
pub mod status;
pub mod stream;

pub use notification::{
    Notification, NotificationId, NotificationType, PollResponse, Priority, PublishSignalRequest,
    UnknownVariant,
};
pub use simulation::{
    CustomerDetails, OrderItem, PlanSnapshot, SimulationAccepted, StartSimulationRequest,
    TransitionSnapshot,
};
pub use status::{Difficulty, LifecycleStatus};
pub use stream::StreamCloseCode;
