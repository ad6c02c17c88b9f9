//! Project title normalization
//!
//! Project titles come from a free-text template parameter, so editors put
//! markup and phrasing into them that must not create distinct projects.

/// Storage limit for project titles, in characters
pub const MAX_TITLE_CHARS: usize = 255;

const BOLD_MARKUP: &str = "'''";

/// Subproject phrasing such as "Novels/the Crime task force".
/// Case-sensitive: "Novels/The Canterbury Tales" is a legitimate title.
const SUBPROJECT_ARTICLE: &str = "/the ";

/// Normalize a raw project title into its canonical key
///
/// Removes bold markup, collapses `/the ` to `/` and truncates to
/// [`MAX_TITLE_CHARS`] characters. Cleaning an already cleaned title returns
/// it unchanged.
pub fn clean_project_title(raw: &str) -> String {
    let mut title = raw.replace(BOLD_MARKUP, "");

    // "A/the the B" only loses one article per pass
    while title.contains(SUBPROJECT_ARTICLE) {
        title = title.replace(SUBPROJECT_ARTICLE, "/");
    }

    truncate_chars(&mut title, MAX_TITLE_CHARS);
    title
}

fn truncate_chars(s: &mut String, max_chars: usize) {
    if let Some((byte_idx, _)) = s.char_indices().nth(max_chars) {
        s.truncate(byte_idx);
    }
}
