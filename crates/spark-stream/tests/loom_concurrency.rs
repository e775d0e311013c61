#![cfg(loom)]

use loom::{model, thread};
use spark_stream::{BytesStore, ContentBuilder, Cursor, ReadStatus, test_stubs::ReleaseCounter};

fn composed(digits: &ReleaseCounter, upper: &ReleaseCounter) -> Cursor {
    let mut cursor = ContentBuilder::new(BytesStore::from_static(b"0123"))
        .on_data_release(digits.data_hook())
        .build()
        .expect("非空后端");
    let tail = ContentBuilder::new(BytesStore::from_static(b"ABCD"))
        .on_data_release(upper.data_hook())
        .build()
        .expect("非空后端");
    cursor.concat(&tail).expect("拼接");
    cursor
}

#[test]
fn boundary_read_races_with_dispose() {
    //
    // 教案级说明：验证跨边界读取与另一游标销毁之间的交错。
    // - **Why**：子流退役在边界锁下摘除快照，若需求计数与锁的配合有误，读者可能读到已退役的子流。
    // - **How**：克隆组合流并移交到工作线程做跨边界读取，主线程同时销毁原游标；Loom 穷举调度交错。
    // - **What**：工作线程始终读到完整的 `"23AB"`；两个线程都结束后，每个子内容块的释放回调恰好执行一次。
    model(|| {
        let digits = ReleaseCounter::new();
        let upper = ReleaseCounter::new();
        let original = composed(&digits, &upper);
        let mut clone = original.clone_at(0).expect("克隆");

        let reader = thread::spawn(move || {
            clone.set_position(2).expect("定位");
            let mut local = [0u8; 4];
            assert_eq!(clone.read(&mut local).expect("读取"), ReadStatus::Read(4));
            assert_eq!(&local, b"23AB");
        });

        original.dispose().expect("销毁原游标");
        reader.join().expect("读取线程不应 panic");
        assert_eq!(digits.data_releases(), 1);
        assert_eq!(upper.data_releases(), 1);
    });
}

#[test]
fn concurrent_releases_retire_head_exactly_once() {
    //
    // 教案级说明：两个克隆各自释放越过子流 A 的全部字节，需求计数会被并发递减到 0。
    // - **Why**：`fetch_sub` 的返回值决定由谁执行退役，必须恰好一个线程胜出。
    // - **What**：无论交错如何，子流 A 的释放回调只执行一次，且在两个克隆都越过边界后才执行。
    model(|| {
        let digits = ReleaseCounter::new();
        let upper = ReleaseCounter::new();
        let mut first = composed(&digits, &upper);
        let mut second = first.clone_at(0).expect("克隆");
        first.set_position(5).expect("定位");
        second.set_position(5).expect("定位");

        let worker = thread::spawn(move || {
            second.release(3).expect("释放");
            second
        });
        first.release(3).expect("释放");
        let second = worker.join().expect("释放线程不应 panic");

        assert_eq!(digits.data_releases(), 1);
        assert_eq!(upper.data_releases(), 0);
        drop(first);
        drop(second);
        assert_eq!(upper.data_releases(), 1);
    });
}
