//! User-visible strings. Verbatim, never rephrased — downstream formatting
//! (Discord markdown, emoji) is part of the contract, not incidental styling.

pub const TIMEOUT: &str = "⏰ **Request Timeout**: Your request took too long to process. Please try again with a simpler question.";

pub const PROCESSING_ERROR: &str = "❌ **Processing Error**: Something went wrong while processing your request. Please try again later.";

pub const QUEUE_FULL: &str = "❌ **Queue Full**: Too many requests are being processed right now. Please try again in a moment.";

pub const DM_ONLY: &str = "🔒 **DM Only**: This command only works in direct messages.";

pub fn queued_position(position: usize, total: usize) -> String {
    format!("⏳ **Queued**: position {position} of {total}.")
}
