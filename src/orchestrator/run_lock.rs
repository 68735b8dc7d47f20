//! 运行锁 - 编排层
//!
//! 同一台机器同一时间只允许一次运行。锁文件里只写持有者的 PID：
//! - 文件不存在：发布自己的 PID
//! - 文件存在且持有者仍存活：立即失败，不排队等待
//! - 文件存在但持有者已退出（或内容无法解析）：视为残留锁，回收
//!
//! 发布时先把 PID 完整写进同目录下的临时文件，再用硬链接放到锁路径上，
//! 其他进程要么看不到锁文件，要么看到完整内容。硬链接在目标已存在时失败，
//! 所以同一时刻只有一个发布者成功。
//!
//! 回收残留锁的进程之间用一个同样靠硬链接发布的回收标记互斥。拿到标记后再读一次锁文件，
//! 仍是刚才判定为残留的那份才删除。残留文件还在时没人能发布新锁，
//! 所以删掉的不可能是别人刚写的锁。
//!
//! 释放由 [`RunLockGuard`] 的 Drop 保证，任何退出路径都会删除锁文件。

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

use crate::error::{AppResult, LockError};

/// 发布与回收的最大轮数
const MAX_ATTEMPTS: usize = 5;
/// 空锁文件的复查次数与间隔（外部写入者可能还没写完）
const SETTLE_CHECKS: usize = 10;
const SETTLE_INTERVAL: Duration = Duration::from_millis(50);

/// 回收标记超过这个时长视为回收者崩溃后的遗留
const RECLAIM_MARKER_EXPIRY: Duration = Duration::from_secs(30);

/// 临时文件名去重
static NONCE: AtomicU64 = AtomicU64::new(0);

/// 进程存活检查（可注入，便于测试）
pub type LivenessCheck = Arc<dyn Fn(u32) -> bool + Send + Sync>;

/// 基于 sysinfo 的默认存活检查
pub fn process_is_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    system.process(pid).is_some()
}

/// 锁文件当前的内容
#[derive(Debug, Clone, PartialEq, Eq)]
enum LockContent {
    Missing,
    Empty,
    Pid(u32),
    Garbage(String),
}

impl LockContent {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return LockContent::Empty;
        }
        match trimmed.parse() {
            Ok(pid) => LockContent::Pid(pid),
            Err(_) => LockContent::Garbage(trimmed.to_string()),
        }
    }
}

/// 一次发布尝试的结果
enum Publish {
    Acquired,
    Occupied,
}

/// 运行锁
pub struct RunLock {
    path: PathBuf,
    is_alive: LivenessCheck,
}

impl RunLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_liveness(path, Arc::new(process_is_alive))
    }

    pub fn with_liveness(path: impl Into<PathBuf>, is_alive: LivenessCheck) -> Self {
        Self {
            path: path.into(),
            is_alive,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 获取锁；持有者存活时返回 [`LockError::AlreadyRunning`]
    pub fn acquire(&self) -> AppResult<RunLockGuard> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let pid = std::process::id();
        for attempt in 1..=MAX_ATTEMPTS {
            if let Publish::Acquired = self.publish(pid)? {
                debug!("🔒 已获取运行锁 {} (pid: {})", self.path.display(), pid);
                return Ok(RunLockGuard {
                    path: self.path.clone(),
                    pid,
                });
            }

            let observed = self.settled_content()?;
            match observed {
                // 持有者刚好释放，直接重试发布
                LockContent::Missing => continue,
                LockContent::Pid(holder) if (self.is_alive)(holder) => {
                    return Err(LockError::AlreadyRunning { pid: holder }.into());
                }
                _ => {}
            }

            if !self.reclaim(&observed)? {
                // 另一个进程正在回收，稍后重新判断
                std::thread::sleep(SETTLE_INTERVAL);
            }
            debug!("运行锁第 {} 次尝试未成功，重试", attempt);
        }

        let holder = match self.read_content()? {
            LockContent::Pid(holder) => holder,
            _ => 0,
        };
        Err(LockError::AlreadyRunning { pid: holder }.into())
    }

    /// 写临时文件后硬链接到锁路径；目标已存在时返回 Occupied
    fn publish(&self, pid: u32) -> AppResult<Publish> {
        let tmp = self.sibling("tmp");
        let result = write_new(&tmp, pid.to_string().as_bytes())
            .and_then(|()| fs::hard_link(&tmp, &self.path));
        let _ = fs::remove_file(&tmp);

        match result {
            Ok(()) => Ok(Publish::Acquired),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(Publish::Occupied),
            Err(e) => Err(self.io_error(e).into()),
        }
    }

    /// 读锁文件；空内容时稍等复查，给还没写完的写入者留时间
    fn settled_content(&self) -> AppResult<LockContent> {
        let mut content = self.read_content()?;
        for _ in 0..SETTLE_CHECKS {
            if content != LockContent::Empty {
                break;
            }
            std::thread::sleep(SETTLE_INTERVAL);
            content = self.read_content()?;
        }
        Ok(content)
    }

    fn read_content(&self) -> AppResult<LockContent> {
        read_lock_content(&self.path).map_err(|e| self.io_error(e).into())
    }

    /// 在回收标记保护下删除残留锁；标记被别人持有时返回 false
    fn reclaim(&self, expected: &LockContent) -> AppResult<bool> {
        let marker = self.reclaim_marker();
        let tmp = self.sibling("tmp");
        let claimed = write_new(&tmp, std::process::id().to_string().as_bytes())
            .and_then(|()| fs::hard_link(&tmp, &marker));
        let _ = fs::remove_file(&tmp);

        match claimed {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                self.expire_reclaim_marker(&marker);
                return Ok(false);
            }
            Err(e) => return Err(self.io_error(e).into()),
        }

        let result = self.remove_if_unchanged(expected);
        if let Err(e) = fs::remove_file(&marker) {
            warn!("⚠️ 删除回收标记失败 {}: {}", marker.display(), e);
        }
        result.map(|()| true)
    }

    fn remove_if_unchanged(&self, expected: &LockContent) -> AppResult<()> {
        let current = self.read_content()?;
        if &current != expected {
            debug!("锁文件在回收前已变化，放弃本次回收");
            return Ok(());
        }
        match expected {
            LockContent::Pid(pid) => info!("🔓 回收残留运行锁 (pid {} 已退出)", pid),
            _ => warn!("🔓 锁文件内容无法识别，回收"),
        }
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e).into()),
        }
    }

    /// 回收者崩溃留下的标记过期后删除
    fn expire_reclaim_marker(&self, marker: &Path) {
        let expired = fs::metadata(marker)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .map_or(false, |age| age > RECLAIM_MARKER_EXPIRY);
        if expired {
            warn!("🔓 清理过期的回收标记 {}", marker.display());
            let _ = fs::remove_file(marker);
        }
    }

    fn reclaim_marker(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".reclaim");
        PathBuf::from(name)
    }

    /// 锁文件同目录下的唯一文件名
    fn sibling(&self, kind: &str) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "lock".to_string());
        let nonce = NONCE.fetch_add(1, Ordering::Relaxed);
        self.path
            .with_file_name(format!("{}.{}.{}.{}", name, kind, std::process::id(), nonce))
    }

    fn io_error(&self, source: std::io::Error) -> LockError {
        LockError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

fn write_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn read_lock_content(path: &Path) -> std::io::Result<LockContent> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(LockContent::parse(&raw)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(LockContent::Missing),
        // 非 UTF-8 内容按无法识别处理
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            Ok(LockContent::Garbage("<binary>".to_string()))
        }
        Err(e) => Err(e),
    }
}

/// 持有期间锁有效，Drop 时释放
#[derive(Debug)]
pub struct RunLockGuard {
    path: PathBuf,
    pid: u32,
}

impl RunLockGuard {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// 显式释放（等同于 drop）
    pub fn release(self) {}
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        // 锁已经被别人回收时不能删掉别人的锁
        let still_ours =
            matches!(read_lock_content(&self.path), Ok(LockContent::Pid(pid)) if pid == self.pid);
        if still_ours {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!("释放运行锁失败 {}: {}", self.path.display(), e);
            } else {
                debug!("🔓 已释放运行锁");
            }
        }
    }
}
