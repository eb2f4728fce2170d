use std::thread;
use std::time::Duration;

fn main() {
    let handle = thread::spawn(|| thread::sleep(Duration::from_millis(300)));

    handle.join().unwrap();
}
