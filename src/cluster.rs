//! Field clusterer: groups inserted tokens into logical values

use crate::config::EngineConfig;
use crate::model::{FieldCluster, TextToken};

/// Group consecutive insertions (reading order) into clusters.
///
/// A token joins the open cluster when it is on the same page and either
/// sits on the previous token's line within `cluster_horizontal_gap_factor`
/// line heights, or starts the next line within `cluster_line_gap_factor`
/// line heights while overlapping the cluster horizontally. Anything else
/// opens a new cluster.
pub fn cluster(insertions: &[TextToken], config: &EngineConfig) -> Vec<FieldCluster> {
    let mut groups: Vec<Vec<&TextToken>> = Vec::new();

    for token in insertions {
        let joins = groups
            .last()
            .map_or(false, |group| continues(group, token, config));
        match groups.last_mut() {
            Some(group) if joins => group.push(token),
            _ => groups.push(vec![token]),
        }
    }

    groups.into_iter().map(build_cluster).collect()
}

fn continues(group: &[&TextToken], token: &TextToken, config: &EngineConfig) -> bool {
    let Some(prev) = group.last() else {
        return false;
    };
    if prev.page_index != token.page_index {
        return false;
    }

    let line_height = prev.height.max(token.height).max(f32::EPSILON);

    if prev.same_line(token) {
        let gap = token.x - prev.right();
        return gap <= config.cluster_horizontal_gap_factor * line_height;
    }

    let vertical_gap = token.y - prev.bottom();
    if vertical_gap < -line_height * 0.5 || vertical_gap >= config.cluster_line_gap_factor * line_height
    {
        return false;
    }

    // A wrapped value stays under its first line; a token in another column
    // on the next line is a different field
    let left = group.iter().map(|t| t.x).fold(f32::MAX, f32::min);
    let right = group.iter().map(|t| t.right()).fold(f32::MIN, f32::max);
    let slack = config.cluster_horizontal_gap_factor * line_height;
    token.x <= right + slack && token.right() >= left - slack
}

fn build_cluster(tokens: Vec<&TextToken>) -> FieldCluster {
    let mut region = tokens[0].region();
    let mut value = String::new();

    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            region = region.union(&token.region());
            value.push(if tokens[i - 1].same_line(token) { ' ' } else { '\n' });
        }
        value.push_str(&token.text.split_whitespace().collect::<Vec<_>>().join(" "));
    }

    FieldCluster {
        tokens: tokens.into_iter().cloned().collect(),
        region,
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tok(text: &str, x: f32, y: f32, page_index: usize) -> TextToken {
        TextToken {
            text: text.to_string(),
            x,
            y,
            width: 6.0 * text.len() as f32,
            height: 10.0,
            font_size: 10.0,
            page_index,
        }
    }

    fn values(clusters: &[FieldCluster]) -> Vec<&str> {
        clusters.iter().map(|c| c.value.as_str()).collect()
    }

    #[test]
    fn test_words_on_one_line_join() {
        let tokens = vec![
            tok("Acme", 100.0, 200.0, 0),
            tok("Constructors", 128.0, 200.0, 0),
            tok("Ltd", 206.0, 200.0, 0),
        ];
        let clusters = cluster(&tokens, &EngineConfig::default());
        assert_eq!(values(&clusters), vec!["Acme Constructors Ltd"]);
        let region = clusters[0].region;
        assert_eq!(region.x, 100.0);
        assert_eq!(region.right(), 224.0);
        assert_eq!(region.height, 10.0);
    }

    #[test]
    fn test_multi_line_value_keeps_newlines() {
        let tokens = vec![
            tok("12", 100.0, 300.0, 0),
            tok("Moi", 116.0, 300.0, 0),
            tok("Avenue", 138.0, 300.0, 0),
            tok("Nairobi", 100.0, 312.0, 0),
        ];
        let clusters = cluster(&tokens, &EngineConfig::default());
        assert_eq!(values(&clusters), vec!["12 Moi Avenue\nNairobi"]);
        assert_eq!(clusters[0].region.height, 22.0);
    }

    #[test]
    fn test_distant_lines_split() {
        let tokens = vec![tok("Acme", 100.0, 200.0, 0), tok("0712", 100.0, 240.0, 0)];
        let clusters = cluster(&tokens, &EngineConfig::default());
        assert_eq!(values(&clusters), vec!["Acme", "0712"]);
    }

    #[test]
    fn test_wide_gap_on_one_line_splits() {
        let tokens = vec![tok("0712345678", 100.0, 250.0, 0), tok("a@b.co", 370.0, 250.0, 0)];
        let clusters = cluster(&tokens, &EngineConfig::default());
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_next_line_in_other_column_splits() {
        let tokens = vec![tok("info@acme.co", 370.0, 250.0, 0), tok("Nairobi", 100.0, 261.0, 0)];
        let clusters = cluster(&tokens, &EngineConfig::default());
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_page_boundary_splits() {
        let tokens = vec![tok("Acme", 100.0, 800.0, 0), tok("Ltd", 100.0, 20.0, 1)];
        let clusters = cluster(&tokens, &EngineConfig::default());
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[1].page_index(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster(&[], &EngineConfig::default()).is_empty());
    }
}
