#![no_main]

use arca_fe::core::InvoiceNumber;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Anything that parses must print back to a parseable number.
        if let Ok(n) = s.parse::<InvoiceNumber>() {
            assert_eq!(n.to_string().parse::<InvoiceNumber>().ok(), Some(n));
        }
    }
});
