//! Commercial font families mapped to open-license substitutes.

/// Brand token (lowercase) to substitute family. Longer, more specific tokens
/// come before shorter ones that they contain.
const ALIASES: &[(&str, &str)] = &[
    ("helvetica", "Arimo"),
    ("arial", "Arimo"),
    ("times", "Tinos"),
    ("courier", "Cousine"),
    ("calibri", "Carlito"),
    ("cambria", "Caladea"),
    ("segoe", "Open Sans"),
    ("proxima nova", "Montserrat"),
    ("gotham", "Montserrat"),
    ("avenir", "Nunito Sans"),
    ("garamond", "EB Garamond"),
    ("georgia", "Gelasio"),
    ("verdana", "Noto Sans"),
    ("tahoma", "Noto Sans"),
    ("futura", "Jost"),
    ("gill sans", "Lato"),
    ("franklin gothic", "Libre Franklin"),
    ("century gothic", "Questrial"),
    ("myriad", "PT Sans"),
    ("palatino", "Crimson Pro"),
    ("book antiqua", "Crimson Pro"),
    ("consolas", "Inconsolata"),
    ("trebuchet", "Fira Sans"),
    ("comic sans", "Comic Neue"),
    ("impact", "Anton"),
];

/// Open substitute for a commercial family, if one of the brand tokens
/// appears in the name (case-insensitive).
pub fn substitute(family: &str) -> Option<&'static str> {
    let lower = family.to_lowercase();
    ALIASES
        .iter()
        .find(|(token, _)| lower.contains(token))
        .map(|(_, substitute)| *substitute)
        .filter(|substitute| !substitute.eq_ignore_ascii_case(family.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brand_tokens_match_partially() {
        assert_eq!(substitute("Helvetica Neue"), Some("Arimo"));
        assert_eq!(substitute("HelveticaNeue-Light"), Some("Arimo"));
        assert_eq!(substitute("Arial Narrow"), Some("Arimo"));
        assert_eq!(substitute("Times New Roman"), Some("Tinos"));
        assert_eq!(substitute("Segoe UI Semibold"), Some("Open Sans"));
        assert_eq!(substitute("Proxima Nova Rg"), Some("Montserrat"));
        assert_eq!(substitute("ITC Franklin Gothic"), Some("Libre Franklin"));
    }

    #[test]
    fn test_unknown_and_open_families_are_left_alone() {
        assert_eq!(substitute("Zorblax Display"), None);
        assert_eq!(substitute("Open Sans"), None);
        assert_eq!(substitute("Montserrat"), None);
    }
}
