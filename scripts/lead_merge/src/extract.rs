//! Field extraction for the two export formats

use crate::types::{RawRow, SourceFormat};

/// Column names a format exposes for the fields the merge needs
#[derive(Debug, Clone, Copy)]
pub struct ColumnLayout {
    pub name: &'static str,
    pub phone: &'static str,
    pub model: &'static str,
    pub channel: &'static str,
    /// Consulted only when `channel` is empty
    pub channel_fallback: Option<&'static str>,
}

const YICHE_LAYOUT: ColumnLayout = ColumnLayout {
    name: "客户姓名",
    phone: "客户号码",
    model: "线索意向车型车系",
    channel: "商业产品来源",
    channel_fallback: Some("来源"),
};

const AUTOHOME_LAYOUT: ColumnLayout = ColumnLayout {
    name: "客户姓名",
    phone: "客户手机",
    model: "意向车系",
    channel: "BMD二级渠道",
    channel_fallback: None,
};

impl SourceFormat {
    pub fn layout(&self) -> &'static ColumnLayout {
        match self {
            SourceFormat::Yiche => &YICHE_LAYOUT,
            SourceFormat::Autohome => &AUTOHOME_LAYOUT,
        }
    }
}

/// Raw fields pulled from one row, before rule mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFields {
    pub name: String,
    pub phone: String,
    pub raw_model: Option<String>,
    pub raw_channel: Option<String>,
}

/// Trim a cell and drop anything from the first `/` on.
///
/// Exports append secondary identifiers after a slash ("王伟/备注").
pub fn remove_after_slash(value: Option<&str>) -> String {
    let value = match value {
        Some(v) => v.trim(),
        None => return String::new(),
    };

    match value.split_once('/') {
        Some((head, _)) => head.trim().to_string(),
        None => value.to_string(),
    }
}

/// Pull name/phone/model/channel out of a row.
///
/// Returns `None` when name or phone is empty; such rows are skipped, not errors.
pub fn extract_fields(format: SourceFormat, row: &RawRow) -> Option<ExtractedFields> {
    let layout = format.layout();

    let name = remove_after_slash(row.get(layout.name));
    let phone = remove_after_slash(row.get(layout.phone));
    if name.is_empty() || phone.is_empty() {
        return None;
    }

    let raw_model = non_empty(row.get(layout.model));
    let raw_channel = non_empty(row.get(layout.channel))
        .or_else(|| layout.channel_fallback.and_then(|col| non_empty(row.get(col))));

    Some(ExtractedFields {
        name,
        phone,
        raw_model,
        raw_channel,
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_after_slash() {
        assert_eq!(remove_after_slash(Some("王伟/备注")), "王伟");
        assert_eq!(remove_after_slash(Some(" 13800000000 / 旧号")), "13800000000");
        assert_eq!(remove_after_slash(Some("  李娜  ")), "李娜");
        assert_eq!(remove_after_slash(Some("/只有备注")), "");
        assert_eq!(remove_after_slash(None), "");
    }

    #[test]
    fn test_extract_yiche_row() {
        let row = RawRow::from_pairs([
            ("客户姓名", "王伟/备注"),
            ("客户号码", "13800000000/旧号"),
            ("线索意向车型车系", "别克君越2024款"),
            ("商业产品来源", "易车网"),
        ]);
        let fields = extract_fields(SourceFormat::Yiche, &row).unwrap();
        assert_eq!(fields.name, "王伟");
        assert_eq!(fields.phone, "13800000000");
        assert_eq!(fields.raw_model.as_deref(), Some("别克君越2024款"));
        assert_eq!(fields.raw_channel.as_deref(), Some("易车网"));
    }

    #[test]
    fn test_yiche_channel_falls_back_when_primary_empty() {
        let row = RawRow::from_pairs([
            ("客户姓名", "刘洋"),
            ("客户号码", "13600000000"),
            ("商业产品来源", "  "),
            ("来源", "抖音"),
        ]);
        let fields = extract_fields(SourceFormat::Yiche, &row).unwrap();
        assert_eq!(fields.raw_channel.as_deref(), Some("抖音"));
        assert_eq!(fields.raw_model, None);
    }

    #[test]
    fn test_autohome_has_no_channel_fallback() {
        let row = RawRow::from_pairs([
            ("客户姓名", "陈明"),
            ("客户手机", "13500000000"),
            ("来源", "抖音"),
        ]);
        let fields = extract_fields(SourceFormat::Autohome, &row).unwrap();
        assert_eq!(fields.raw_channel, None);
    }

    #[test]
    fn test_missing_name_or_phone_skips_row() {
        let no_phone = RawRow::from_pairs([("客户姓名", "周杰"), ("客户手机", "/")]);
        assert!(extract_fields(SourceFormat::Autohome, &no_phone).is_none());

        let no_name = RawRow::from_pairs([("客户号码", "13900000000")]);
        assert!(extract_fields(SourceFormat::Yiche, &no_name).is_none());
    }
}
