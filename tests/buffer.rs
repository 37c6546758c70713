// Buffer and RawBuffer integration suite.
//
// Invariants exercised:
// - LIFO: N pushes then N pops return the values reversed; capacity never
//   shrinks across pushes.
// - reserve below len fails with DataError and changes nothing.
// - Foreach abort: the processed prefix is exactly the elements before the
//   failing one; the failing element and the tail are untouched.
use bedrock::buffer::{DEFAULT_CAPACITY, GROW_FACTOR};
use bedrock::{Buffer, Error, RawBuffer};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn push_then_pop_reverses(values in proptest::collection::vec(any::<i64>(), 0..600), initial in 0usize..8) {
        let mut b: Buffer<i64> = Buffer::with_capacity(initial).unwrap();
        let mut last_cap = b.capacity();
        for v in &values {
            b.push(*v).unwrap();
            prop_assert!(b.capacity() >= last_cap);
            prop_assert!(b.capacity() >= b.len());
            last_cap = b.capacity();
        }
        let mut popped = Vec::with_capacity(values.len());
        while !b.is_empty() {
            popped.push(b.pop().unwrap());
        }
        popped.reverse();
        prop_assert_eq!(popped, values);
        prop_assert_eq!(b.len(), 0);
        prop_assert_eq!(b.pop().unwrap_err(), Error::Index);
    }

    #[test]
    fn reserve_below_len_is_rejected(len in 1usize..100, below in 0usize..100) {
        let items: Vec<u32> = (0..len as u32).collect();
        let mut b = Buffer::from_slice(&items).unwrap();
        let cap = b.capacity();
        let target = below % len;
        prop_assert_eq!(b.reserve(target).unwrap_err(), Error::Data);
        prop_assert_eq!(b.capacity(), cap);
        prop_assert_eq!(b.as_slice(), &items[..]);
    }
}

#[test]
fn growth_follows_factor() {
    let mut b: Buffer<u8> = Buffer::with_capacity(3).unwrap();
    for i in 0..4 {
        b.push(i).unwrap();
    }
    assert_eq!(b.capacity(), 3 * GROW_FACTOR);

    let b: Buffer<u8> = Buffer::with_capacity(0).unwrap();
    assert_eq!(b.capacity(), DEFAULT_CAPACITY);
}

#[test]
fn foreach_abort_halves_prefix() {
    let mut b: Buffer<i64> = Buffer::with_capacity(0).unwrap();
    for i in 0..200i64 {
        b.push(i * 2).unwrap();
    }
    *b.at_mut(100).unwrap() = 201;

    let mut halved = 0;
    let res = b.try_for_each(|x| {
        if *x % 2 != 0 {
            return Err(Error::Data);
        }
        *x /= 2;
        halved += 1;
        Ok(())
    });
    assert_eq!(res.unwrap_err(), Error::Data);
    assert_eq!(halved, 100);
    for i in 0..100 {
        assert_eq!(*b.at(i).unwrap(), i as i64);
    }
    assert_eq!(*b.at(100).unwrap(), 201);
    for i in 101..200 {
        assert_eq!(*b.at(i).unwrap(), i as i64 * 2);
    }
}

#[test]
fn raw_buffer_holds_runtime_stride_records() {
    let mut r = RawBuffer::new(6, 2).unwrap();
    for i in 0u16..5 {
        let mut rec = [0u8; 6];
        rec[..2].copy_from_slice(&i.to_ne_bytes());
        rec[2..].copy_from_slice(&(u32::from(i) * 1000).to_ne_bytes());
        r.push(&rec).unwrap();
    }
    assert_eq!(r.len(), 5);
    assert!(r.capacity() >= 5);
    assert_eq!(r.read_pod::<u16>(3).unwrap_err(), Error::Type);
    let rec = r.at(3).unwrap();
    assert_eq!(u16::from_ne_bytes([rec[0], rec[1]]), 3);
    assert_eq!(u32::from_ne_bytes([rec[2], rec[3], rec[4], rec[5]]), 3000);

    assert_eq!(r.push(&[0u8; 4]).unwrap_err(), Error::Data);
    assert_eq!(r.len(), 5);
}

#[test]
fn raw_buffer_typed_round_trip_and_map() {
    let src = RawBuffer::from_pod_slice(&[1u32, 2, 3, 4]).unwrap();
    assert_eq!(src.stride(), 4);
    assert_eq!(src.read_pod::<u32>(2).unwrap(), 3);

    let mut wide = RawBuffer::new(8, 0).unwrap();
    src.map_into(&mut wide, 8, |from, to| {
        let v = u64::from(u32::from_ne_bytes([from[0], from[1], from[2], from[3]]));
        to.copy_from_slice(&(v * 10).to_ne_bytes());
        Ok(())
    })
    .unwrap();
    assert_eq!(wide.len(), 4);
    assert_eq!(wide.read_pod::<u64>(3).unwrap(), 40);
}
