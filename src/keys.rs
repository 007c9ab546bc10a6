//! The object-key scheme: keys are derived mechanically so
//! that listing a bucket under `datas3t/` suffices for reconstruction.

use std::sync::OnceLock;

use regex::Regex;

pub const ENTRY_NAME_RE: &str = r"^(\d{20})\.[^.]+$";
const IMPORT_KEY_RE: &str = r"^datas3t/([^/]+)/dataranges/(\d{20})-(\d{20})-(\d{12})\.tar$";

pub struct ObjectKeys {
    pub data: String,
    pub index: String,
}

/// Builds the `.tar`/`.index` object keys for a datarange or aggregate.
pub fn build(datas3t_name: &str, first_idx: i64, last_idx: i64, upload_counter: u64) -> ObjectKeys {
    let prefix = format!("datas3t/{datas3t_name}/dataranges/{first_idx:020}-{last_idx:020}-{upload_counter:012}");
    ObjectKeys {
        data: format!("{prefix}.tar"),
        index: format!("{prefix}.index"),
    }
}

/// A parsed `datas3t/<name>/dataranges/<first>-<last>-<counter>.tar` key,
/// as produced by the import scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDataKey {
    pub datas3t_name: String,
    pub first_idx: i64,
    pub last_idx: i64,
    pub upload_counter: u64,
}

pub fn parse_data_key(key: &str) -> Option<ParsedDataKey> {
    let caps = import_key_regex().captures(key)?;
    Some(ParsedDataKey {
        datas3t_name: caps.get(1)?.as_str().to_owned(),
        first_idx: caps.get(2)?.as_str().parse().ok()?,
        last_idx: caps.get(3)?.as_str().parse().ok()?,
        upload_counter: caps.get(4)?.as_str().parse().ok()?,
    })
}

/// Validates an entry filename inside a TAR matches `^\d{20}\.[^.]+$` and
/// decodes its 20-digit prefix to a datapoint key.
pub fn parse_entry_key(filename: &str) -> Option<i64> {
    let caps = entry_name_regex().captures(filename)?;
    caps.get(1)?.as_str().parse().ok()
}

fn entry_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ENTRY_NAME_RE).expect("valid regex"))
}

fn import_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(IMPORT_KEY_RE).expect("valid regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_fixed_width_keys() {
        let keys = build("mydata", 0, 99, 7);
        assert_eq!(
            keys.data,
            "datas3t/mydata/dataranges/00000000000000000000-00000000000000000099-000000000007.tar"
        );
        assert_eq!(
            keys.index,
            "datas3t/mydata/dataranges/00000000000000000000-00000000000000000099-000000000007.index"
        );
    }

    #[test]
    fn parses_data_keys_round_trip() {
        let keys = build("mydata", 10, 19, 3);
        let parsed = parse_data_key(&keys.data).unwrap();
        assert_eq!(parsed.datas3t_name, "mydata");
        assert_eq!(parsed.first_idx, 10);
        assert_eq!(parsed.last_idx, 19);
        assert_eq!(parsed.upload_counter, 3);
    }

    #[test]
    fn ignores_non_matching_keys() {
        assert!(parse_data_key("datas3t/mydata/dataranges/garbage.tar").is_none());
        assert!(parse_data_key(
            "datas3t/mydata/dataranges/00000000000000000000-00000000000000000099-000000000007.index"
        )
        .is_none());
    }

    #[test]
    fn entry_key_decodes_prefix() {
        assert_eq!(parse_entry_key("00000000000000000042.bin"), Some(42));
        assert_eq!(parse_entry_key("not-a-datapoint.bin"), None);
        assert_eq!(parse_entry_key("00000000000000000042.tar.gz"), None);
    }
}
