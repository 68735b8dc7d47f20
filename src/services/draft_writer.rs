//! 草稿写入服务 - 业务能力层
//!
//! 只负责"把一篇稿子写成 markdown"能力，不关心流程。
//! 同一天同一社区多次写入时加序号，不覆盖已有草稿。

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::post_record::Angle;
use crate::models::profile::bare_community;

/// 草稿写入服务
///
/// 职责：
/// - 生成 `drafts/{date}-{community}.md`
/// - 读取已有草稿作为内容生成的示例
/// - 不关心发帖成败
pub struct DraftWriter {
    drafts_dir: PathBuf,
}

/// 从草稿中读回的标题和正文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftExample {
    pub title: String,
    pub body: String,
}

impl DraftWriter {
    pub fn new(drafts_dir: impl Into<PathBuf>) -> Self {
        Self {
            drafts_dir: drafts_dir.into(),
        }
    }

    pub fn drafts_dir(&self) -> &Path {
        &self.drafts_dir
    }

    /// 写入草稿，返回实际文件路径
    pub async fn write(
        &self,
        community: &str,
        angle: Angle,
        title: &str,
        body: &str,
        notes: &str,
        date: NaiveDate,
    ) -> AppResult<PathBuf> {
        fs::create_dir_all(&self.drafts_dir)
            .await
            .map_err(|e| AppError::file_write_failed(self.drafts_dir.display().to_string(), e))?;

        let slug = bare_community(community).to_lowercase().replace('/', "-");
        let stem = format!("{}-{}", date.format("%Y-%m-%d"), slug);
        let content = render_draft(community, angle, title, body, notes, date);

        let mut counter = 0;
        loop {
            let name = if counter == 0 {
                format!("{}.md", stem)
            } else {
                format!("{}-{}.md", stem, counter)
            };
            let path = self.drafts_dir.join(name);

            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(content.as_bytes())
                        .await
                        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
                    debug!("草稿已保存: {}", path.display());
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => counter += 1,
                Err(e) => return Err(AppError::file_write_failed(path.display().to_string(), e)),
            }
        }
    }

    /// 读取最近的草稿作为示例（按文件名倒序，最多 `limit` 篇）
    pub async fn load_examples(&self, limit: usize) -> Vec<DraftExample> {
        let mut entries = match fs::read_dir(&self.drafts_dir).await {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut paths = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "md") {
                paths.push(path);
            }
        }
        paths.sort();
        paths.reverse();

        let mut examples = Vec::new();
        for path in paths.into_iter().take(limit * 2) {
            let Ok(content) = fs::read_to_string(&path).await else {
                continue;
            };
            if let Some(example) = parse_draft(&content) {
                examples.push(example);
                if examples.len() >= limit {
                    break;
                }
            }
        }
        examples
    }
}

fn render_draft(
    community: &str,
    angle: Angle,
    title: &str,
    body: &str,
    notes: &str,
    date: NaiveDate,
) -> String {
    let notes = if notes.trim().is_empty() { "(none)" } else { notes };
    format!(
        r#"# Draft: {community}

**Date:** {date}
**Status:** draft
**Angle:** {angle} - {angle_name}

---

## Title

{title}

---

## Body

{body}

---

## Notes

{notes}

---

## Post Checklist

- [ ] 标题未使用促销词汇
- [ ] 以价值/故事开头，产品在后
- [ ] 透明披露了自己是开发者
- [ ] 结尾有具体的问题
- [ ] 内容适配该社区的语气
- [ ] 已发布到社区
- [ ] 已记录帖子 URL
"#,
        community = community,
        date = date.format("%Y-%m-%d"),
        angle = angle,
        angle_name = angle.name(),
        title = title,
        body = body,
        notes = notes,
    )
}

/// 从草稿 markdown 中取回标题和正文
pub fn parse_draft(content: &str) -> Option<DraftExample> {
    #[derive(PartialEq)]
    enum Section {
        Other,
        Title,
        Body,
    }

    let mut section = Section::Other;
    let mut title = String::new();
    let mut body_lines: Vec<&str> = Vec::new();

    for line in content.lines() {
        if line.starts_with("## ") {
            section = match line.trim() {
                "## Title" => Section::Title,
                "## Body" => Section::Body,
                _ => Section::Other,
            };
            continue;
        }
        if line.trim() == "---" {
            continue;
        }
        match section {
            Section::Title if title.is_empty() && !line.trim().is_empty() => {
                title = line.trim().to_string();
            }
            Section::Body => body_lines.push(line),
            _ => {}
        }
    }

    let body = body_lines.join("\n").trim().to_string();
    (!title.is_empty() && !body.is_empty()).then_some(DraftExample { title, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    #[tokio::test]
    async fn collisions_get_numeric_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DraftWriter::new(dir.path().join("drafts"));

        let first = writer
            .write("r/SideProject", Angle::A, "t1", "b1", "", date())
            .await
            .unwrap();
        let second = writer
            .write("r/SideProject", Angle::B, "t2", "b2", "", date())
            .await
            .unwrap();

        assert!(first.ends_with("2026-03-10-sideproject.md"));
        assert!(second.ends_with("2026-03-10-sideproject-1.md"));
    }

    #[tokio::test]
    async fn written_drafts_are_read_back_as_examples() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DraftWriter::new(dir.path());
        writer
            .write("r/rust", Angle::C, "What I learned", "Line one\n\nLine two?", "n", date())
            .await
            .unwrap();

        let examples = writer.load_examples(2).await;
        assert_eq!(
            examples,
            vec![DraftExample {
                title: "What I learned".to_string(),
                body: "Line one\n\nLine two?".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn missing_directory_yields_no_examples() {
        let writer = DraftWriter::new("/definitely/not/here");
        assert!(writer.load_examples(2).await.is_empty());
    }
}
