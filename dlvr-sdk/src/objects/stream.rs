//! Close codes for the notification stream.
//!
//! The `GET /api/v1/users/{user_id}/notifications/ws` endpoint upgrades to a
//! WebSocket and pushes one JSON [`Notification`](super::Notification) per
//! text frame. The server never expects application frames from the client;
//! it sends periodic pings so idle connections can be told apart from dead
//! ones.

/// Well-known WebSocket close codes used by the notification stream.
///
/// See [RFC 6455 §7.4.1](https://www.rfc-editor.org/rfc/rfc6455#section-7.4.1).
pub struct StreamCloseCode;

impl StreamCloseCode {
    /// The server is shutting down.
    pub const GOING_AWAY: u16 = 1001;

    /// An unexpected server-side error prevented the stream from continuing.
    pub const INTERNAL_ERROR: u16 = 1011;
}
