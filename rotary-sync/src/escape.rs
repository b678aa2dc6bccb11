//! Flattening command tokens into one shell-safe string.
//!
//! rsync's `-e` option takes a single string which rsync splits again on
//! whitespace, honouring single and double quotes. Nested token lists are
//! therefore flattened and quoted exactly once here.
//!
//! Commands run on a target through ssh go through a full POSIX shell
//! instead; [`shell_quote`] quotes every word that is not plainly safe.

/// Something that renders as a single escaped shell word or word list.
pub trait Escape {
    fn escape(&self) -> String;
}

impl Escape for str {
    fn escape(&self) -> String {
        quote(self)
    }
}

impl Escape for String {
    fn escape(&self) -> String {
        quote(self)
    }
}

impl<T: Escape> Escape for [T] {
    fn escape(&self) -> String {
        self.iter().map(Escape::escape).collect::<Vec<_>>().join(" ")
    }
}

impl<T: Escape> Escape for Vec<T> {
    fn escape(&self) -> String {
        self.as_slice().escape()
    }
}

impl<T: Escape, const N: usize> Escape for [T; N] {
    fn escape(&self) -> String {
        self.as_slice().escape()
    }
}

impl<T: Escape + ?Sized> Escape for &T {
    fn escape(&self) -> String {
        (**self).escape()
    }
}

macro_rules! escape_display {
    ($($ty:ty),*) => {
        $(impl Escape for $ty {
            fn escape(&self) -> String {
                quote(&self.to_string())
            }
        })*
    };
}

escape_display!(u16, u32, u64, usize, i32, i64);

/// Render `value` as one shell-safe string.
pub fn escape<T: Escape + ?Sized>(value: &T) -> String {
    value.escape()
}

/// Quote `word` for a POSIX shell. Words made only of
/// `[A-Za-z0-9_./=:,@+-]` pass through unchanged.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_./=:,@+-".contains(c));
    if safe {
        return word.to_string();
    }
    single_quote(word)
}

fn single_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r#"'"'"'"#))
}

fn quote(word: &str) -> String {
    let needs_quoting =
        word.is_empty() || word.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"');
    if !needs_quoting {
        return word.to_string();
    }
    single_quote(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_word_is_unchanged() {
        assert_eq!(escape("simple"), "simple");
        assert_eq!(escape("/srv/data-app_1.tar"), "/srv/data-app_1.tar");
    }

    #[test]
    fn whitespace_is_quoted() {
        assert_eq!(escape("has space"), "'has space'");
        assert_eq!(escape("tab\there"), "'tab\there'");
    }

    #[test]
    fn quotes_are_escaped() {
        assert_eq!(escape("it's"), r#"'it'"'"'s'"#);
        assert_eq!(escape(r#"say "hi""#), r#"'say "hi"'"#);
    }

    #[test]
    fn empty_word_is_quoted() {
        assert_eq!(escape(""), "''");
    }

    #[test]
    fn sequences_join_with_single_space() {
        assert_eq!(escape(&["a b", "c"]), "'a b' c");
        let nested = vec![vec!["ssh", "-i"], vec!["/keys/my key"]];
        assert_eq!(escape(&nested), "ssh -i '/keys/my key'");
    }

    #[test]
    fn shell_quote_leaves_safe_words_alone() {
        assert_eq!(shell_quote("/backups/2024-01-01T00-00/data/app"), "/backups/2024-01-01T00-00/data/app");
        assert_eq!(shell_quote("-sfn"), "-sfn");
    }

    #[test]
    fn shell_quote_neutralises_metacharacters() {
        assert_eq!(shell_quote("/b/x;touch y"), "'/b/x;touch y'");
        assert_eq!(shell_quote("$HOME"), "'$HOME'");
        assert_eq!(shell_quote("a*|b&"), "'a*|b&'");
        assert_eq!(shell_quote("it's"), r#"'it'"'"'s'"#);
        assert_eq!(shell_quote(""), "''");
        // rsync's own quoting leaves these bare.
        assert_eq!(escape("/b/x;touch"), "/b/x;touch");
    }

    #[test]
    fn numbers_render_as_strings() {
        assert_eq!(escape(&2222u16), "2222");
        let tokens: Vec<String> = vec!["-p".into(), 22.to_string()];
        assert_eq!(escape(&tokens), "-p 22");
    }
}
