//! # Prepdesk (Exam Preparation Content API)
//!
//! `prepdesk` is the backend for an exam-preparation product: exams, their
//! subjects, questions, files, and bookmarks, with subscription-tiered access
//! control on top.
//!
//! ## Content Model (Exams, Subjects, Questions)
//!
//! Exams are the top-level resources. Each exam owns subjects, and questions
//! and files attach to an exam with an optional subject.
//!
//! - **Slugs:** exams and subjects are addressed by lowercase URL-safe slugs
//!   (`[a-z0-9-]`). Exam slugs are globally unique; subject slugs are unique
//!   within their exam. Collisions resolve deterministically by numeric
//!   suffix, and UNIQUE constraints back the probe against concurrent writers.
//! - **Denormalized totals:** exams and subjects carry subject/question/file
//!   counts so list pages render without aggregate queries.
//!
//! ## Subscriptions & Usage
//!
//! Users are mirrored from the external identity provider through webhook
//! events; their `subscription_tier` selects a plan row holding numeric
//! limits (`-1` = unlimited) and boolean feature flags. Rate-limited actions
//! are counted per user per calendar day; the day key is computed in a
//! configured UTC offset so counters reset by date arithmetic, not by a
//! scheduled job. Limit checks on unknown actions or features fail closed.
//!
//! ## What stays external
//!
//! Token validation happens at the authenticating edge, which forwards the
//! subject in `x-user-id`. Webhook signatures are verified upstream; this
//! service checks a shared secret. Billing and file blob storage live with
//! their providers; only references are stored here.

pub mod access;
pub mod api;
pub mod cli;
pub mod clock;
pub mod slug;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }
}
