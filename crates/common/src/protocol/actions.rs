// Action discriminators carried in the `action` field of every message.

// ── Review/capture context → background ────────────────────────────
pub const GET_CONTENT: &str = "getContent";
pub const SAVE_SUMMARY: &str = "saveSummary";
pub const PROCESS_AND_SEND_CONTENT: &str = "processAndSendContent";
pub const GET_SUMMARY_STATE: &str = "getSummaryState";
pub const CLEAR_SUMMARY: &str = "clearSummary";
pub const SHOW_NOTIFICATION: &str = "showNotification";
pub const POPUP_CLOSED: &str = "popupClosed";

// ── Background → review context ────────────────────────────────────
pub const HANDLE_SUMMARY_RESPONSE: &str = "handleSummaryResponse";
pub const SAVE_SUMMARY_RESPONSE: &str = "saveSummaryResponse";
pub const FLOATING_BALL_RESPONSE: &str = "floatingBallResponse";
pub const CLEAR_SUMMARY_RESPONSE: &str = "clearSummaryResponse";

// ── Background/review → capture context ────────────────────────────
pub const UPDATE_FLOATING_BALL_STATE: &str = "updateFloatingBallState";

/// Actions the background router dispatches.
pub const BACKGROUND_ACTIONS: &[&str] = &[
    GET_CONTENT,
    SAVE_SUMMARY,
    PROCESS_AND_SEND_CONTENT,
    GET_SUMMARY_STATE,
    CLEAR_SUMMARY,
    SHOW_NOTIFICATION,
    POPUP_CLOSED,
];

/// Push notifications a review context listens for.
pub const POPUP_ACTIONS: &[&str] = &[
    HANDLE_SUMMARY_RESPONSE,
    SAVE_SUMMARY_RESPONSE,
    FLOATING_BALL_RESPONSE,
    CLEAR_SUMMARY_RESPONSE,
];

/// Requests a capture context answers.
pub const TAB_ACTIONS: &[&str] = &[GET_CONTENT, UPDATE_FLOATING_BALL_STATE];
