#![no_main]
use bashfs::modules::constants::ROOT_INODE;
use bashfs::Namespace;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Treat the input as a path and walk it segment by segment
    let mut ns = Namespace::default();
    let mut ino = ROOT_INODE;
    for segment in data.split(|&b| b == b'/') {
        let before = ns.len();
        match ns.lookup(ino, segment) {
            Ok(node) => ino = node.ino,
            Err(_) => {
                assert_eq!(ns.len(), before);
                break;
            }
        }
    }
    let _ = ns.reconstruct_command(ino);
});
