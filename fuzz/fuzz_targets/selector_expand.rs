//! Selector parsing, matching, and expansion over arbitrary input: no
//! panics, expansion respects its cap, and expansion results match the
//! selector that produced them.

#![no_main]

use hackvr_proto::Selector;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (&str, &str)| {
    let (selector_text, candidate) = input;
    let Some(selector) = Selector::parse(selector_text) else {
        return;
    };

    // Matching never panics on arbitrary candidates.
    let _ = selector.matches(candidate);

    if let Ok(expanded) = selector.expand_create(64) {
        assert!(expanded.len() <= 64);
        for id in &expanded {
            assert!(
                selector.matches(id.as_str()),
                "expansion {id} does not match its own selector {selector}"
            );
        }
    }
});
