//! # olap-segment-creator 使用案例
//!
//! 1. 定义 schema（单值 / 多值 / nullable）
//! 2. 按行写入并按 `event_day` 物理排序
//! 3. 构建段（字典 + 正排 + 倒排）
//! 4. 通过 mmap 读回并用倒排做等值过滤
//! 5. 用排序列的区间正排做范围定位

use olap_segment_creator::{
    BitmapInvertedIndexReader, Cell, DataType, DictionaryReader, FieldSpec, FixedBitMultiValueReader,
    FixedBitSingleValueReader, SegmentCreator, SegmentDirectory, SortedIndexReader, Value,
};

fn main() -> olap_segment_creator::Result<()> {
    println!("═══════════════════════════════════════════════════════════");
    println!("   olap-segment-creator 演示                               ");
    println!("═══════════════════════════════════════════════════════════\n");

    // =========================================================================
    // 1. Schema
    // =========================================================================
    let schema = vec![
        FieldSpec::new("event_day", DataType::Int32),
        FieldSpec::new("country", DataType::String).nullable(),
        FieldSpec::new("latency_ms", DataType::Float64),
        FieldSpec::new("tags", DataType::String).multi_valued(),
    ];
    println!("【1】schema: {:?}\n", schema.iter().map(|f| f.name.as_str()).collect::<Vec<_>>());

    // =========================================================================
    // 2. 写入
    // =========================================================================
    let mut creator = SegmentCreator::new(schema)
        .with_sorted_column("event_day")?
        .with_inverted_index(&["country", "tags"])?;

    let rows: Vec<(i32, Option<&str>, f64, Vec<&str>)> = vec![
        (20240103, Some("US"), 12.5, vec!["web", "mobile"]),
        (20240101, Some("CN"), 8.0,  vec!["web"]),
        (20240102, None,       31.2, vec![]),
        (20240101, Some("US"), 9.9,  vec!["api", "web"]),
        (20240103, Some("DE"), 15.0, vec!["mobile"]),
    ];
    for (day, country, latency, tags) in &rows {
        creator.append_row(vec![
            (*day).into(),
            (*country).map_or(Cell::Null, Cell::from),
            (*latency).into(),
            Cell::Multi(tags.iter().map(|&t| Value::from(t)).collect()),
        ])?;
    }
    println!("【2】写入 {} 行\n", creator.num_docs());

    // =========================================================================
    // 3. 构建
    // =========================================================================
    let seg_path = std::env::temp_dir().join("olap-segment-demo");
    let dir      = SegmentDirectory::new(&seg_path)?;
    let meta     = creator.build(&dir)?;
    println!("【3】段目录 {}", seg_path.display());
    for col in &meta.columns {
        println!(
            "    {:<10} card={:<3} bits={:<2} values={:<3} sorted={:<5} inv={:<5} dict={}B fwd={}B",
            col.name, col.cardinality, col.bits_per_element, col.total_values,
            col.is_sorted, col.has_inverted_index, col.dictionary_size, col.forward_index_size,
        );
    }
    println!();

    // =========================================================================
    // 4. 读回
    // =========================================================================
    println!("【4】按新 doc 顺序读回");
    let day_dict  = DictionaryReader::open(dir.open_mmap("event_day.dict")?)?;
    let day_fwd   = FixedBitSingleValueReader::open(dir.open_mmap("event_day.sv.fwd")?)?;
    let ctry_dict = DictionaryReader::open(dir.open_mmap("country.dict")?)?;
    let ctry_fwd  = FixedBitSingleValueReader::open(dir.open_mmap("country.sv.fwd")?)?;
    let tag_dict  = DictionaryReader::open(dir.open_mmap("tags.dict")?)?;
    let tag_fwd   = FixedBitMultiValueReader::open(dir.open_mmap("tags.mv.fwd")?)?;

    let mut day_ctx  = day_fwd.create_context();
    let mut ctry_ctx = ctry_fwd.create_context();
    let mut tag_ctx  = tag_fwd.create_context();
    let mut tag_ids  = vec![0u32; tag_fwd.max_values_per_doc() as usize];
    for doc in 0..meta.num_docs {
        let day     = day_dict.value(day_fwd.get_value(doc, &mut day_ctx)?)?;
        let country = ctry_dict.value(ctry_fwd.get_value(doc, &mut ctry_ctx)?)?;
        let n       = tag_fwd.get_values(doc, &mut tag_ids, &mut tag_ctx)?;
        let mut tags = Vec::new();
        tag_dict.read_values::<String>(&tag_ids[..n], &mut tags)?;
        println!("    doc {doc}: day={day} country={country} tags={tags:?}");
    }
    println!();

    // =========================================================================
    // 5. 倒排过滤
    // =========================================================================
    let tag_inv = BitmapInvertedIndexReader::open(dir.open_mmap("tags.inv")?)?;
    if let Some(web) = tag_dict.index_of_value(&Value::from("web"))? {
        let docs: Vec<u32> = tag_inv.doc_ids(web)?.iter().collect();
        println!("【5】tags = 'web' → docs {docs:?}");
    }

    // =========================================================================
    // 6. 排序列区间
    // =========================================================================
    let day_sorted = SortedIndexReader::open(dir.open_mmap("event_day.sorted.fwd")?)?;
    println!("【6】event_day 区间正排");
    for dict_id in 0..day_sorted.cardinality() {
        println!("    {} → docs {:?}", day_dict.value(dict_id)?, day_sorted.doc_range(dict_id)?);
    }

    std::fs::remove_dir_all(&seg_path)?;
    Ok(())
}
