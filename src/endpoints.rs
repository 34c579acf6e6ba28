//! Penguin X REST endpoint paths, relative to the `/api/v1` base URL.

/// Build the path of a single item, e.g. `/transactions/42`.
pub fn item(collection: &str, id: impl std::fmt::Display) -> String {
    format!("{}/{}", collection.trim_end_matches('/'), id)
}

/// Session endpoints.
pub mod auth {
    /// Exchange username and password for tokens.
    pub const LOGIN: &str = "/auth/login";
    /// Create an account.
    pub const REGISTER: &str = "/auth/register";
    /// Exchange a refresh token for a new access token.
    pub const REFRESH: &str = "/auth/refresh";
    /// The authenticated user.
    pub const ME: &str = "/auth/me";
    /// End the session.
    pub const LOGOUT: &str = "/auth/logout";
}

/// Personal finance endpoints.
pub mod finance {
    /// List or create transactions.
    pub const TRANSACTIONS: &str = "/transactions";
    /// Income and expense summary.
    pub const SUMMARY: &str = "/summary";
    /// List or create budgets.
    pub const BUDGETS: &str = "/budgets";
}

/// Investment endpoints.
pub mod invest {
    /// List or create investments.
    pub const INVESTMENTS: &str = "/investments";
    /// List or create watchlists.
    pub const WATCHLISTS: &str = "/watchlists";
}

/// Learning content endpoints.
pub mod academy {
    /// List or create courses.
    pub const COURSES: &str = "/courses";
    /// List or create lessons.
    pub const LESSONS: &str = "/lessons";
}

/// User endpoints.
pub mod users {
    /// List or create users.
    pub const USERS: &str = "/users";
    /// The caller's profile.
    pub const PROFILE: &str = "/profile";
}

/// Administrator endpoints, rejected with 403 for regular users.
pub mod admin {
    /// Finance totals across all users.
    pub const SUMMARY: &str = "/admin/summary";
    /// Every user's transactions.
    pub const ALL_TRANSACTIONS: &str = "/admin/all-transactions";
    /// Course management listing.
    pub const COURSES: &str = "/admin/courses";
    /// User statistics.
    pub const DASHBOARD: &str = "/admin/dashboard";
    /// Every user's investments.
    pub const ALL_INVESTMENTS: &str = "/admin/all-investments";
    /// Portfolio totals across all users.
    pub const PORTFOLIO_SUMMARY: &str = "/admin/portfolio-summary";
}
