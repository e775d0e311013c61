//! 游标位置算术与组合引擎的性质验证。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：拼接、拆分、克隆都只改写位置簿记而不复制数据，任何平移量或窗口计算的
//!   偏差都会表现为读出的字节序列错位。以随机数据、随机切分点、随机读取块长驱动公开 API，
//!   并与“直接切片”这一影子模型比对。
//! - **设计手法 (How)**：
//!   1. `split_then_concat_round_trips`：任意拆分点拆开再拼回，字节序列不变；
//!   2. `composed_chunked_reads_match_concatenation`：多段拼接后以任意块长读取，等价于切片拼接；
//!   3. `clone_reads_source_suffix`：任意偏移克隆读出源游标当前位置之后的字节，且位置按偏移平移；
//!   4. `release_boundary_is_exact`：释放后首个有效位置恰为 `p + 1`。
//! - **合同与边界 (What)**：数据长度 2..=256，段数 1..=5；生成器保证拆分点位于开区间内。

use proptest::prelude::*;
use spark_stream::prelude::*;

fn data_and_point() -> impl Strategy<Value = (Vec<u8>, usize)> {
    prop::collection::vec(any::<u8>(), 2..=256)
        .prop_flat_map(|data| {
            let len = data.len();
            (Just(data), 1..len)
        })
}

fn read_all_in_chunks(cursor: &mut Cursor, chunk: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut local = vec![0u8; chunk];
    loop {
        match cursor.read(&mut local).expect("内存后端不会失败") {
            ReadStatus::Read(count) => out.extend_from_slice(&local[..count]),
            ReadStatus::EndOfStream => return out,
        }
    }
}

proptest! {
    #[test]
    fn split_then_concat_round_trips((data, point) in data_and_point()) {
        let mut head = Cursor::from_bytes(data.clone()).unwrap();
        let mut tail = head.split(point).unwrap();
        prop_assert_eq!(head.remaining_size().unwrap(), point);
        prop_assert_eq!(tail.remaining_size().unwrap(), data.len() - point);

        head.concat(&tail).unwrap();
        tail.dispose().unwrap();
        prop_assert_eq!(read_all_in_chunks(&mut head, 7), data);
    }

    #[test]
    fn composed_chunked_reads_match_concatenation(
        pieces in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..64), 1..=5),
        chunk in 1usize..80,
    ) {
        let mut cursors = pieces.iter().map(|piece| Cursor::from_bytes(piece.clone()).unwrap());
        let mut composed = cursors.next().unwrap();
        for cursor in cursors {
            composed.concat(&cursor).unwrap();
        }
        let expected: Vec<u8> = pieces.concat();
        prop_assert_eq!(composed.remaining_size().unwrap(), expected.len());
        prop_assert_eq!(read_all_in_chunks(&mut composed, chunk), expected);
    }

    #[test]
    fn clone_reads_source_suffix(
        (data, point) in data_and_point(),
        offset in 0usize..1_000_000,
    ) {
        let mut source = Cursor::from_bytes(data.clone()).unwrap();
        source.set_position(point).unwrap();
        let mut clone = source.clone_at(offset).unwrap();
        prop_assert_eq!(clone.position().unwrap(), offset);
        prop_assert_eq!(
            clone.set_position(offset.wrapping_sub(1)).map_err(|err| err.kind()),
            Err(ErrorKind::NotFound)
        );
        prop_assert_eq!(read_all_in_chunks(&mut clone, 5), data[point..].to_vec());
        prop_assert_eq!(source.position().unwrap(), point);
    }

    #[test]
    fn release_boundary_is_exact((data, point) in data_and_point()) {
        let mut cursor = Cursor::from_bytes(data).unwrap();
        cursor.set_position(point).unwrap();
        let released = point - 1;
        cursor.release(released).unwrap();
        prop_assert_eq!(cursor.set_position(released).unwrap_err().kind(), ErrorKind::NotFound);
        prop_assert_eq!(cursor.release(released).unwrap_err().kind(), ErrorKind::NotFound);
        cursor.reset().unwrap();
        prop_assert_eq!(cursor.position().unwrap(), point);
    }
}
