//! API 响应的数据模型。

use serde::Deserialize;

/// twirp 接口的统一信封：`code != 0` 即业务错误。
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

/// ComicDetail 接口返回的漫画详情。
#[derive(Debug, Clone, Deserialize)]
pub struct ComicDetailData {
    pub title: String,
    #[serde(default)]
    pub author_name: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub evaluate: String,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub is_finish: i32,
    #[serde(default)]
    pub ep_list: Vec<EpisodeData>,
}

/// 章节列表里的单条记录（接口原始形态，未做标题归一化）。
#[derive(Debug, Clone, Deserialize)]
pub struct EpisodeData {
    pub id: u64,
    // B站的章节序号可能为小数（如 24.5 话），也可能重复或乱序
    #[serde(default)]
    pub ord: f64,
    #[serde(default)]
    pub short_title: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub image_count: u32,
    #[serde(default)]
    pub pub_time: String,
}

/// GetImageIndex 返回的图片路径列表。
#[derive(Debug, Deserialize)]
pub struct ImageIndexData {
    #[serde(default)]
    pub images: Vec<ImagePathEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ImagePathEntry {
    pub path: String,
}

/// ImageToken 返回的 url + token 对。
#[derive(Debug, Clone, Deserialize)]
pub struct ImageToken {
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_detail_envelope() {
        let raw = r#"{
            "code": 0,
            "msg": "",
            "data": {
                "title": "测试漫画",
                "author_name": ["作者"],
                "styles": ["奇幻"],
                "evaluate": "简介",
                "total": 2,
                "is_finish": 1,
                "ep_list": [
                    {"id": 2, "ord": 2, "short_title": "2", "title": "结束", "is_locked": true, "size": 100, "image_count": 5, "pub_time": "2023-01-02 00:00:00"},
                    {"id": 1, "ord": 1, "short_title": "1", "title": "开始", "is_locked": false, "size": 200, "image_count": 8, "pub_time": "2023-01-01 00:00:00"}
                ]
            }
        }"#;
        let env: ApiEnvelope<ComicDetailData> = serde_json::from_str(raw).unwrap();
        assert_eq!(env.code, 0);
        let data = env.data.unwrap();
        assert_eq!(data.title, "测试漫画");
        assert_eq!(data.ep_list.len(), 2);
        assert!(data.ep_list[0].is_locked);
        assert_eq!(data.ep_list[1].size, 200);
    }

    #[test]
    fn tolerates_missing_optional_fields() {
        let raw = r#"{"id": 7}"#;
        let ep: EpisodeData = serde_json::from_str(raw).unwrap();
        assert_eq!(ep.id, 7);
        assert_eq!(ep.ord, 0.0);
        assert!(!ep.is_locked);
        assert!(ep.title.is_empty());
    }

    #[test]
    fn parses_image_token_pairs() {
        let raw = r#"[{"url": "https://i0.example/1.jpg", "token": "abc"}, {"url": "https://i0.example/2.jpg"}]"#;
        let tokens: Vec<ImageToken> = serde_json::from_str(raw).unwrap();
        assert_eq!(tokens[0].token.as_deref(), Some("abc"));
        assert!(tokens[1].token.is_none());
    }
}
