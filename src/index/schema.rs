//! Tantivy schema for the keyword/symbol index.
//!
//! One document per live file version. Content is the BM25-scored body;
//! the symbol-side fields (names, exports, imports, basename) are
//! indexed for candidate recall and stored for boost computation.

use tantivy::schema::{
    Field, IndexRecordOption, NumericOptions, STORED, STRING, Schema, SchemaBuilder,
    TextFieldIndexing, TextOptions,
};

#[derive(Debug, Clone)]
pub struct KeywordSchema {
    /// Absolute path; exact term used for per-file replacement.
    pub path: Field,
    /// File basename, tokenised and stored.
    pub basename: Field,
    /// Full text content; the base BM25 field.
    pub content: Field,
    /// Newline-joined symbol names.
    pub symbols: Field,
    /// Newline-joined defined (class/function/method) names.
    pub defined: Field,
    /// Newline-joined exported names.
    pub exports: Field,
    /// Newline-joined import specifiers.
    pub imports: Field,
    /// Modification time, seconds.
    pub mtime: Field,
    /// Content hash of the indexed version.
    pub file_hash: Field,
}

impl KeywordSchema {
    pub fn build() -> (Schema, Self) {
        let mut builder = SchemaBuilder::default();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer("default")
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let path = builder.add_text_field("path", STRING | STORED);
        let basename = builder.add_text_field("basename", text_options.clone());
        // Content is indexed but not stored; previews come from the
        // content store, not the index.
        let content_options = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("default")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );
        let content = builder.add_text_field("content", content_options);
        let symbols = builder.add_text_field("symbols", text_options.clone());
        let defined = builder.add_text_field("defined", text_options.clone());
        let exports = builder.add_text_field("exports", text_options.clone());
        let imports = builder.add_text_field("imports", text_options);
        let mtime = builder.add_i64_field(
            "mtime",
            NumericOptions::default().set_stored().set_fast(),
        );
        let file_hash = builder.add_text_field("file_hash", STRING | STORED);

        let schema = builder.build();
        let fields = Self {
            path,
            basename,
            content,
            symbols,
            defined,
            exports,
            imports,
            mtime,
            file_hash,
        };
        (schema, fields)
    }
}
