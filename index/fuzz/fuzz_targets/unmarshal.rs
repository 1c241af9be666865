#![no_main]

use commonware_index::full::{Config, FullIndex, Index};
use libfuzzer_sys::fuzz_target;

fn fuzz(data: &[u8]) {
    let cfg = Config { max_entries: 1024 };
    let Ok(index) = Index::unmarshal(&mut &data[..], &cfg) else {
        return;
    };

    // Anything accepted must re-encode to the same bytes
    let mut buf = Vec::with_capacity(index.encoded_len());
    index.marshal(&mut buf).unwrap();
    assert_eq!(buf, data);
    assert_eq!(index.encoded_len(), data.len());
}

fuzz_target!(|data: &[u8]| {
    fuzz(data);
});
