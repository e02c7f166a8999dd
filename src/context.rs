//! キャンセルコンテキスト
//!
//! すべての `send` と `read` に渡され、I/O の前と内部ポーリングの各反復で確認される。
//!
//! ```rust
//! use std::time::Duration;
//! use shiguredo_http11_transport::Context;
//!
//! let root = Context::new();
//! let ctx = root.with_timeout(Duration::from_secs(30));
//! assert!(!ctx.is_cancelled());
//!
//! // 親をキャンセルすると子もキャンセルされる
//! root.cancel();
//! assert!(ctx.is_cancelled());
//! assert!(ctx.check().is_err());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// キャンセルトークン
///
/// `Clone` は同じトークンを共有する。別スレッドから `cancel()` してよい。
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<Context>,
}

impl Context {
    /// キャンセルされていないルートコンテキストを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 子コンテキストを作成
    ///
    /// 子のキャンセルは親に伝播しない。
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: None,
                parent: Some(self.clone()),
            }),
        }
    }

    /// 期限付きの子コンテキストを作成
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: Some(deadline),
                parent: Some(self.clone()),
            }),
        }
    }

    /// 現在時刻からのタイムアウト付きの子コンテキストを作成
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// キャンセルする
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    /// 祖先を含めた最も早い期限
    pub fn deadline(&self) -> Option<Instant> {
        let mut deadline = self.inner.deadline;
        let mut parent = self.inner.parent.as_ref();
        while let Some(ctx) = parent {
            deadline = match (deadline, ctx.inner.deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            parent = ctx.inner.parent.as_ref();
        }
        deadline
    }

    /// 期限までの残り時間
    ///
    /// 期限がなければ `None`、期限を過ぎていれば `Some(Duration::ZERO)`。
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// キャンセル済みか (祖先のキャンセル・期限切れを含む)
    pub fn is_cancelled(&self) -> bool {
        let mut ctx = Some(self);
        while let Some(c) = ctx {
            if c.inner.cancelled.load(Ordering::Acquire) {
                return true;
            }
            if c.inner.deadline.is_some_and(|d| Instant::now() >= d) {
                return true;
            }
            ctx = c.inner.parent.as_ref();
        }
        false
    }

    /// キャンセル済みなら `Error::Cancelled` を返す
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// `limit` を期限までの残り時間で切り詰める
    ///
    /// ブロッキング呼び出しのタイムアウトに使う。ゼロにはしない
    /// (`set_read_timeout(Some(ZERO))` はエラーになるため)。
    pub(crate) fn bound(&self, limit: Duration) -> Duration {
        let bounded = match self.remaining() {
            Some(remaining) => limit.min(remaining),
            None => limit,
        };
        bounded.max(Duration::from_millis(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_context_is_not_cancelled() {
        let ctx = Context::new();
        assert!(!ctx.is_cancelled());
        assert!(ctx.check().is_ok());
        assert_eq!(ctx.deadline(), None);
        assert_eq!(ctx.remaining(), None);
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let ctx = Context::new();
        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn child_cancel_does_not_propagate_up() {
        let parent = Context::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn parent_cancel_propagates_down() {
        let parent = Context::new();
        let grandchild = parent.child().child();
        parent.cancel();
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn expired_deadline_cancels() {
        let ctx = Context::new().with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn earliest_deadline_wins() {
        let now = Instant::now();
        let outer = Context::new().with_deadline(now + Duration::from_secs(10));
        let inner = outer.with_deadline(now + Duration::from_secs(60));
        assert_eq!(inner.deadline(), Some(now + Duration::from_secs(10)));
    }

    #[test]
    fn bound_never_returns_zero() {
        let ctx = Context::new().with_deadline(Instant::now() - Duration::from_secs(1));
        assert_eq!(ctx.bound(Duration::from_secs(5)), Duration::from_millis(1));
        let ctx = Context::new();
        assert_eq!(ctx.bound(Duration::from_secs(5)), Duration::from_secs(5));
    }

    #[test]
    fn cancel_from_another_thread() {
        let ctx = Context::new();
        let remote = ctx.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(ctx.is_cancelled());
    }
}
