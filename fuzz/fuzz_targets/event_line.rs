#![no_main]

use libfuzzer_sys::fuzz_target;
use regionprof::call_stack::StackScope;
use regionprof::ingest::EventIngestor;
use regionprof::region::RegionRegistry;
use regionprof::timestamp::Timestamp;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Neither parsing nor ingesting arbitrary lines may panic
        let registry = Arc::new(RegionRegistry::new());
        registry.begin("R", "P1", Timestamp::Unknown);
        let mut ingestor = EventIngestor::new(registry, StackScope::Shared);
        for line in input.lines() {
            ingestor.ingest_line(line);
        }
        let _ = ingestor.finish();
    }
});
