use crate::api::{ApiGateway, HttpTransport};
use crate::content::ContentAnalyzer;
use crate::history::HistoryScanner;
use crate::types::{Comment, Post};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde_json::json;
use std::collections::HashSet;

const POST_FETCH_LIMIT: u32 = 20;
const COMMENT_FETCH_LIMIT: u32 = 100;

/// Raw counters accumulated over one author's window of activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreInputs {
    pub posts: u64,
    pub post_words: u64,
    pub post_replies: u64,
    pub post_votes: u64,
    pub comments: u64,
    pub comment_words: u64,
}

impl ScoreInputs {
    /// Weighted engagement score. An author without posts scores 0, and the
    /// comment term contributes nothing when there are no comments (that
    /// denominator needs its own guard).
    pub fn score(&self) -> f64 {
        if self.posts == 0 {
            return 0.0;
        }
        let posts = self.posts as f64;
        let mut score = self.post_words as f64 / posts * 0.4
            + self.post_replies as f64 / posts * 0.1
            + self.post_votes as f64 / posts * 0.001;
        if self.comments > 0 {
            score += self.comment_words as f64 / self.comments as f64 * 0.5;
        }
        score
    }
}

/// Scored author, carrying the structured score next to the rendered line
/// so ranking never re-parses the text.
#[derive(Debug, Clone)]
pub struct ScoreResult {
    pub author: String,
    pub inputs: ScoreInputs,
    pub score: f64,
    pub line: String,
}

/// One eligible post in the compliance report.
#[derive(Debug, Clone)]
pub struct ComplianceEntry {
    pub author: String,
    pub title: String,
    pub permlink: String,
    /// Percentage credited to the configured beneficiary, when present.
    pub beneficiary_percent: Option<u32>,
}

/// Per-author community-rule compliance flags.
#[derive(Debug, Clone)]
pub struct AuthorCompliance {
    pub author: String,
    pub comments: u64,
    pub has_cross_author_reply: bool,
    pub polls_voted: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ComplianceReport {
    pub entries: Vec<ComplianceEntry>,
    pub authors: Vec<AuthorCompliance>,
}

#[derive(Debug, Default)]
struct CommentActivity {
    count: u64,
    words: u64,
    cross_author_reply: bool,
}

/// Pulls an author's posts, comments and history through the gateway,
/// applies the community/time filters and computes scores and compliance
/// flags. Authors are processed one at a time with local accumulators.
pub struct EligibilityEngine<'a, T: HttpTransport> {
    gateway: &'a ApiGateway<T>,
    analyzer: &'a ContentAnalyzer,
    community: String,
    beneficiary: Option<String>,
    polls: HashSet<String>,
}

impl<'a, T: HttpTransport> EligibilityEngine<'a, T> {
    pub fn new(gateway: &'a ApiGateway<T>, analyzer: &'a ContentAnalyzer, community: &str) -> Self {
        Self {
            gateway,
            analyzer,
            community: community.to_string(),
            beneficiary: None,
            polls: HashSet::new(),
        }
    }

    /// Attach the compliance-variant inputs: the beneficiary account to look
    /// for and the set of known poll custom_json ids.
    pub fn with_compliance(mut self, beneficiary: Option<String>, polls: HashSet<String>) -> Self {
        self.beneficiary = beneficiary;
        self.polls = polls;
        self
    }

    /// Most recent in-community posts inside the window. The feed is
    /// reverse-chronological, so the first post past the window ends the
    /// scan.
    fn fetch_posts(&self, author: &str, window_start: NaiveDateTime) -> Result<Vec<Post>> {
        let raw = self.gateway.call_or_empty(
            "bridge.get_account_posts",
            json!({"sort": "posts", "account": author, "limit": POST_FETCH_LIMIT}),
        )?;
        let mut kept = Vec::new();
        for value in raw {
            let post: Post = serde_json::from_value(value)
                .context("malformed post in bridge.get_account_posts result")?;
            let created = post
                .created_at()
                .with_context(|| format!("bad created timestamp on @{}/{}", post.author, post.permlink))?;
            if created < window_start {
                log::info!("no more posts inside the window for {author}");
                break;
            }
            if post.category != self.community {
                continue;
            }
            kept.push(post);
        }
        Ok(kept)
    }

    /// One pass over the author's recent comments: counts and word totals
    /// for in-community, in-window comments, plus the cross-author reply
    /// flag (a comment with exactly one child, answering someone else).
    fn scan_comments(&self, author: &str, window_start: NaiveDateTime) -> Result<CommentActivity> {
        let raw = self.gateway.call_or_empty(
            "bridge.get_account_posts",
            json!({"sort": "comments", "account": author, "limit": COMMENT_FETCH_LIMIT}),
        )?;
        let mut activity = CommentActivity::default();
        for value in raw {
            let comment: Comment = serde_json::from_value(value)
                .context("malformed comment in bridge.get_account_posts result")?;
            let created = comment
                .created_at()
                .with_context(|| format!("bad created timestamp on a comment by {author}"))?;
            if created < window_start {
                break;
            }
            if comment.community.as_deref() != Some(self.community.as_str()) {
                continue;
            }
            activity.count += 1;
            activity.words += self.analyzer.counted_words(&comment.body) as u64;
            if comment.children == 1 && comment.parent_author != author {
                activity.cross_author_reply = true;
            }
        }
        Ok(activity)
    }

    fn reply_count(&self, author: &str, permlink: &str) -> Result<u64> {
        let replies = self
            .gateway
            .call_or_empty("condenser_api.get_content_replies", json!([author, permlink]))?;
        Ok(replies.len() as u64)
    }

    fn vote_count(&self, author: &str, permlink: &str) -> Result<u64> {
        let votes = self
            .gateway
            .call_or_empty("condenser_api.get_active_votes", json!([author, permlink]))?;
        Ok(votes.len() as u64)
    }

    /// Score a single author over the window.
    pub fn score_author(&self, author: &str, window_start: NaiveDateTime) -> Result<ScoreResult> {
        let posts = self.fetch_posts(author, window_start)?;
        let activity = self.scan_comments(author, window_start)?;

        let mut inputs = ScoreInputs {
            posts: posts.len() as u64,
            comments: activity.count,
            comment_words: activity.words,
            ..Default::default()
        };
        for post in &posts {
            inputs.post_words += self.analyzer.counted_words(&post.body) as u64;
            inputs.post_replies += self.reply_count(&post.author, &post.permlink)?;
            inputs.post_votes += self.vote_count(&post.author, &post.permlink)?;
        }

        let score = inputs.score();
        let line = format!(
            "- **{author}** published {} posts totaling {} words, earning {} replies and {} votes, \
             and made {} comments totaling {} words, for a final score of {score:.2} points.",
            inputs.posts,
            inputs.post_words,
            inputs.post_replies,
            inputs.post_votes,
            inputs.comments,
            inputs.comment_words,
        );
        Ok(ScoreResult {
            author: author.to_string(),
            inputs,
            score,
            line,
        })
    }

    /// Score every target author, in the given order.
    pub fn score_all(&self, authors: &[String], window_start: NaiveDateTime) -> Result<Vec<ScoreResult>> {
        let mut results = Vec::with_capacity(authors.len());
        for author in authors {
            log::info!("scoring {author}");
            let result = self
                .score_author(author, window_start)
                .with_context(|| format!("scoring {author}"))?;
            results.push(result);
        }
        Ok(results)
    }

    /// Community-rule compliance over the window. Authors without a single
    /// poll vote inside the poll window are left out entirely.
    pub fn compliance_report(
        &self,
        authors: &[String],
        window_start: NaiveDateTime,
        poll_window_start: NaiveDateTime,
    ) -> Result<ComplianceReport> {
        let scanner = HistoryScanner::new(self.gateway);
        let mut report = ComplianceReport::default();
        for author in authors {
            let posts = self.fetch_posts(author, window_start)?;
            if posts.is_empty() {
                log::info!("{author} has no eligible posts this week");
                continue;
            }
            let activity = self.scan_comments(author, window_start)?;
            let polls_voted = scanner
                .scan_recent_ops(author, poll_window_start, |op| {
                    op.custom_json_id().is_some_and(|id| self.polls.contains(id))
                })
                .with_context(|| format!("scanning poll votes of {author}"))?;
            if polls_voted == 0 {
                log::info!("{author} skipped: no poll votes inside the window");
                continue;
            }

            report.authors.push(AuthorCompliance {
                author: author.clone(),
                comments: activity.count,
                has_cross_author_reply: activity.cross_author_reply,
                polls_voted,
            });
            for post in posts {
                let beneficiary_percent = self.beneficiary.as_deref().and_then(|account| {
                    post.beneficiaries
                        .iter()
                        .find(|b| b.account == account)
                        .map(|b| b.percent())
                });
                report.entries.push(ComplianceEntry {
                    author: author.clone(),
                    title: post.title,
                    permlink: post.permlink,
                    beneficiary_percent,
                });
            }
        }
        Ok(report)
    }
}
