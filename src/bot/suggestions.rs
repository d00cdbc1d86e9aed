/// Songs offered while typing `/play`.
pub const POPULAR_SONGS: &[&str] = &[
    "Despacito",
    "Shape of You",
    "Uptown Funk",
    "See You Again",
    "Sugar",
    "Happy",
    "PPAP",
];

/// Discord rejects autocomplete replies with more choices than this.
const MAX_CHOICES: usize = 25;

/// Case-insensitive substring match over [`POPULAR_SONGS`].
pub fn suggest(current: &str) -> Vec<&'static str> {
    let needle = current.trim().to_lowercase();

    POPULAR_SONGS
        .iter()
        .copied()
        .filter(|song| song.to_lowercase().contains(&needle))
        .take(MAX_CHOICES)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_input_offers_everything() {
        assert_eq!(suggest(""), POPULAR_SONGS.to_vec());
    }

    #[test]
    fn matching_ignores_case() {
        assert_eq!(suggest("UP"), vec!["Uptown Funk"]);
        assert_eq!(suggest("ou"), vec!["Shape of You", "See You Again"]);
    }

    #[test]
    fn no_match_gives_nothing() {
        assert!(suggest("bohemian").is_empty());
    }
}
