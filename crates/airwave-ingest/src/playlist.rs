use crate::error::{IngestError, Result};
use url::Url;

/// HLS 播放列表
///
/// 只解析采集需要的两种形态：带 `#EXT-X-STREAM-INF` 的主列表，
/// 和带 `#EXTINF` 的媒体列表。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Playlist {
    Master { variants: Vec<Url> },
    Media { segments: Vec<Url> },
}

impl Playlist {
    /// 解析播放列表文本，相对 URI 基于 `base` 解析
    pub fn parse(text: &str, base: &Url) -> Result<Self> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty());

        if lines.next() != Some("#EXTM3U") {
            return Err(IngestError::Playlist(format!("{} is not an m3u8 playlist", base)));
        }

        let mut variants = Vec::new();
        let mut segments = Vec::new();
        let mut pending: Option<Tag> = None;

        for line in lines {
            if let Some(tag) = line.strip_prefix('#') {
                if tag.starts_with("EXT-X-STREAM-INF") {
                    pending = Some(Tag::Variant);
                } else if tag.starts_with("EXTINF") {
                    pending = Some(Tag::Segment);
                }
                continue;
            }

            let uri = base
                .join(line)
                .map_err(|e| IngestError::Playlist(format!("invalid uri {}: {}", line, e)))?;
            match pending.take() {
                Some(Tag::Variant) => variants.push(uri),
                Some(Tag::Segment) => segments.push(uri),
                None => {}
            }
        }

        if !variants.is_empty() {
            Ok(Playlist::Master { variants })
        } else {
            Ok(Playlist::Media { segments })
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self, Playlist::Master { .. })
    }
}

#[derive(Debug, Clone, Copy)]
enum Tag {
    Variant,
    Segment,
}

/// 分片身份
///
/// 直播列表中分片名会动态变化，只有末尾的序号部分稳定：
/// 经由主列表得到的分片取最后一个 `_` 之后的部分，平铺媒体列表取路径最后一段。
pub fn segment_identity(uri: &Url, via_variant: bool) -> String {
    let last_segment = uri
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    if via_variant {
        last_segment
            .rsplit('_')
            .next()
            .unwrap_or(last_segment)
            .to_string()
    } else {
        last_segment.to_string()
    }
}
