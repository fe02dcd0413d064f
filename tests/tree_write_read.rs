use tierkv::Config;
use test_log::test;

const ITEM_COUNT: i64 = 10_000;

#[test]
fn tree_write_and_read() -> tierkv::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder)
        .buffer_run_capacity(100)
        .buffer_run_count(8)
        .merge_fraction(0.5)
        .page_size(16)
        .disk_runs_per_level(4)
        .open()?;

    for key in 0..ITEM_COUNT {
        tree.insert(key, key * 2)?;
    }

    for key in 0..ITEM_COUNT {
        assert_eq!(Some(key * 2), tree.get(key)?);
    }
    assert_eq!(None, tree.get(-1)?);
    assert_eq!(None, tree.get(ITEM_COUNT)?);

    assert_eq!(ITEM_COUNT as usize, tree.len()?);

    let stats = tree.stats()?;
    assert!(stats.compactions_completed > 0);
    assert!(stats.level_count() > 1);

    Ok(())
}

#[test]
fn tree_write_read_reverse_order() -> tierkv::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder)
        .buffer_run_capacity(50)
        .buffer_run_count(4)
        .page_size(8)
        .disk_runs_per_level(3)
        .open()?;

    for key in (0..2_000).rev() {
        tree.insert(key, -key)?;
    }

    for key in 0..2_000 {
        assert_eq!(Some(-key), tree.get(key)?);
    }

    Ok(())
}

#[test]
fn tree_write_read_without_bloom_filters() -> tierkv::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder)
        .buffer_run_capacity(20)
        .buffer_run_count(2)
        .bloom_fp_rate(None)
        .open()?;

    for key in 0..500 {
        tree.insert(key * 3, key)?;
    }

    for key in 0..500 {
        assert_eq!(Some(key), tree.get(key * 3)?);
        assert_eq!(None, tree.get(key * 3 + 1)?);
    }

    Ok(())
}

#[test]
fn tree_shared_handle_reads_across_threads() -> tierkv::Result<()> {
    let folder = tempfile::tempdir()?;

    let tree = Config::new(&folder)
        .buffer_run_capacity(50)
        .buffer_run_count(4)
        .open()?;

    for key in 0..1_000 {
        tree.insert(key, key)?;
    }

    let readers = (0..4)
        .map(|_| {
            let tree = tree.clone();
            std::thread::spawn(move || -> tierkv::Result<()> {
                for key in 0..1_000 {
                    assert_eq!(Some(key), tree.get(key)?);
                }
                Ok(())
            })
        })
        .collect::<Vec<_>>();

    for reader in readers {
        reader.join().expect("reader should not panic")?;
    }

    Ok(())
}
