//! Splits file content into [`CodeChunk`]s (§4.7): symbol-driven when a
//! symbol table is available, line-based otherwise.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use wavekeep_core::config::ChunkingConfig;
use wavekeep_core::types::{ChunkType, CodeChunk};

/// Kind of a source-level symbol, as produced by an external parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Type,
    Enum,
    Namespace,
    Module,
    Constant,
    Variable,
}

impl SymbolKind {
    fn chunk_type(self) -> ChunkType {
        match self {
            SymbolKind::Function | SymbolKind::Method => ChunkType::Function,
            SymbolKind::Class => ChunkType::Class,
            SymbolKind::Interface => ChunkType::Interface,
            SymbolKind::Type | SymbolKind::Enum => ChunkType::Type,
            SymbolKind::Namespace | SymbolKind::Module => ChunkType::Module,
            SymbolKind::Constant | SymbolKind::Variable => ChunkType::Block,
        }
    }
}

/// A symbol as reported by an external parser/indexer, 1-indexed lines.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub line: u32,
    pub end_line: u32,
    pub parent_id: Option<String>,
    pub documentation: Option<String>,
}

fn language_for(file: &str) -> &'static str {
    let ext = file.rsplit('.').next().unwrap_or("");
    match ext {
        "ts" | "tsx" | "mts" => "typescript",
        "js" | "jsx" | "mjs" => "javascript",
        "py" => "python",
        "rb" => "ruby",
        "go" => "go",
        "rs" => "rust",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "hpp" | "cc" => "cpp",
        "json" => "json",
        "md" | "markdown" => "markdown",
        "css" | "scss" | "less" => "css",
        "html" | "htm" => "html",
        _ => "unknown",
    }
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn chunk_id(project_id: &str, file: &str, start_line: u32, end_line: u32) -> String {
    hash_content(&format!("{project_id}:{file}:{start_line}:{end_line}"))
}

fn import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?:import\s+.*?\s+from\s+["']([^"']+)["']|require\(["']([^"']+)["']\)|import\(["']([^"']+)["']\))"#).unwrap()
    })
}

fn export_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"export\s+(?:default\s+)?(?:function|class|const|let|var|interface|type|enum)\s+(\w+)"#).unwrap()
    })
}

fn extract_imports(content: &str) -> Vec<String> {
    import_regex()
        .captures_iter(content)
        .filter_map(|c| {
            c.get(1)
                .or_else(|| c.get(2))
                .or_else(|| c.get(3))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

fn extract_exports(content: &str) -> Vec<String> {
    let mut exports: Vec<String> = export_regex()
        .captures_iter(content)
        .map(|c| c[1].to_string())
        .collect();
    if content.contains("export default") {
        exports.push("default".to_string());
    }
    exports
}

fn complexity_of(content: &str) -> u32 {
    static KEYWORD_RE: OnceLock<Regex> = OnceLock::new();
    let keyword_re = KEYWORD_RE.get_or_init(|| {
        Regex::new(r"\b(if|else|for|while|do|switch|case|catch)\b").unwrap()
    });
    let keyword_count = keyword_re.find_iter(content).count();
    let ternary = content.matches('?').count().min(content.matches(':').count());
    let logical = content.matches("&&").count() + content.matches("||").count();
    1 + keyword_count as u32 + ternary as u32 + logical as u32
}

/// Splits `content` into chunks, using `symbols` when non-empty and falling
/// back to line-based chunking per `config` otherwise.
pub struct CodeChunker<'a> {
    config: &'a ChunkingConfig,
}

impl<'a> CodeChunker<'a> {
    pub fn new(config: &'a ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn chunk(
        &self,
        project_id: &str,
        file: &str,
        content: &str,
        symbols: &[Symbol],
    ) -> Vec<CodeChunk> {
        let top_level: Vec<&Symbol> = symbols.iter().filter(|s| s.parent_id.is_none()).collect();
        if top_level.is_empty() {
            self.chunk_by_lines(project_id, file, content)
        } else {
            self.chunk_by_symbols(project_id, file, content, &top_level, symbols)
        }
    }

    fn make_chunk(
        &self,
        project_id: &str,
        file: &str,
        lines: &[&str],
        start_line: u32,
        end_line: u32,
        chunk_type: ChunkType,
        symbol_names: Vec<String>,
        documentation: Option<String>,
    ) -> CodeChunk {
        let text = lines.join("\n");
        let language = language_for(file);
        CodeChunk {
            id: chunk_id(project_id, file, start_line, end_line),
            project_id: project_id.to_string(),
            file: file.to_string(),
            start_line,
            end_line,
            hash: hash_content(&text),
            dependencies: Some(extract_imports(&text)),
            exports: Some(extract_exports(&text)),
            complexity: Some(complexity_of(&text)),
            symbols: symbol_names,
            documentation,
            embedding: None,
            chunk_type,
            language: language.to_string(),
            content: text,
            indexed_at: chrono::Utc::now(),
        }
    }

    fn chunk_by_symbols(
        &self,
        project_id: &str,
        file: &str,
        content: &str,
        top_level: &[&Symbol],
        all_symbols: &[Symbol],
    ) -> Vec<CodeChunk> {
        let lines: Vec<&str> = content.lines().collect();
        let mut sorted = top_level.to_vec();
        sorted.sort_by_key(|s| s.line);

        let mut chunks = Vec::new();
        let slice = |start: u32, end: u32| -> Vec<&str> {
            if start > end || start == 0 {
                return Vec::new();
            }
            lines[(start as usize - 1)..(end as usize).min(lines.len())].to_vec()
        };

        if let Some(first) = sorted.first() {
            if first.line > 1 {
                let preamble = slice(1, first.line - 1);
                if preamble.iter().any(|l| !l.trim().is_empty()) {
                    let preamble_text = preamble.join("\n");
                    let imports = extract_imports(&preamble_text);
                    chunks.push(self.make_chunk(
                        project_id,
                        file,
                        &preamble,
                        1,
                        first.line - 1,
                        ChunkType::Module,
                        imports,
                        None,
                    ));
                }
            }
        }

        for (idx, symbol) in sorted.iter().enumerate() {
            let nested: Vec<String> = all_symbols
                .iter()
                .filter(|s| s.parent_id.as_deref() == Some(symbol.name.as_str()))
                .map(|s| s.name.clone())
                .collect();
            let mut names = vec![symbol.name.clone()];
            names.extend(nested);

            chunks.push(self.make_chunk(
                project_id,
                file,
                &slice(symbol.line, symbol.end_line),
                symbol.line,
                symbol.end_line,
                symbol.kind.chunk_type(),
                names,
                symbol.documentation.clone(),
            ));

            if let Some(next) = sorted.get(idx + 1) {
                if next.line > symbol.end_line + 1 {
                    let gap = slice(symbol.end_line + 1, next.line - 1);
                    if gap.iter().any(|l| !l.trim().is_empty()) {
                        chunks.push(self.make_chunk(
                            project_id,
                            file,
                            &gap,
                            symbol.end_line + 1,
                            next.line - 1,
                            ChunkType::Block,
                            Vec::new(),
                            None,
                        ));
                    }
                }
            }
        }

        if let Some(last) = sorted.last() {
            if (last.end_line as usize) < lines.len() {
                let trailing = slice(last.end_line + 1, lines.len() as u32);
                if trailing.iter().any(|l| !l.trim().is_empty()) {
                    chunks.push(self.make_chunk(
                        project_id,
                        file,
                        &trailing,
                        last.end_line + 1,
                        lines.len() as u32,
                        ChunkType::Block,
                        Vec::new(),
                        None,
                    ));
                }
            }
        }

        chunks
    }

    fn chunk_by_lines(&self, project_id: &str, file: &str, content: &str) -> Vec<CodeChunk> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let total_tokens: u32 = lines.iter().map(|l| estimate_line_tokens(l)).sum();
        let avg_tokens_per_line = (total_tokens as f32 / lines.len() as f32).max(1.0);
        let lines_per_chunk =
            ((self.config.max_chunk_size as f32 / avg_tokens_per_line) as usize).max(10);
        let overlap_lines =
            ((self.config.overlap_size as f32 / avg_tokens_per_line) as usize).min(lines_per_chunk / 2);

        let mut chunks = Vec::new();
        let mut start = 0usize; // 0-indexed
        while start < lines.len() {
            let mut end = (start + lines_per_chunk).min(lines.len());

            if self.config.preserve_boundaries && end < lines.len() {
                let search_start = end.saturating_sub(10).max(start + 1);
                for candidate in (search_start..=end).rev() {
                    let trimmed = lines[candidate - 1].trim();
                    if trimmed == "}" || trimmed == "};" || trimmed.ends_with('}') || trimmed.is_empty() {
                        end = candidate;
                        break;
                    }
                }
            }

            let chunk_lines = &lines[start..end];
            let chunk_tokens: u32 = chunk_lines.iter().map(|l| estimate_line_tokens(l)).sum();
            let is_final = end >= lines.len();
            if chunk_tokens >= self.config.min_chunk_size || is_final {
                chunks.push(self.make_chunk(
                    project_id,
                    file,
                    chunk_lines,
                    start as u32 + 1,
                    end as u32,
                    ChunkType::Block,
                    Vec::new(),
                    None,
                ));
            }

            if end >= lines.len() {
                break;
            }
            // Overlap is a fixed line count, but `end` can shrink a lot when
            // boundary-snapping lands on an early candidate. Only take the
            // overlap if it still advances past the current window; otherwise
            // skip straight to `end` so every iteration makes forward progress.
            let candidate = end.saturating_sub(overlap_lines);
            start = if candidate > start { candidate } else { end };
        }

        chunks
    }
}

fn estimate_line_tokens(line: &str) -> u32 {
    ((line.len() as u32 + 3) / 4).max(1)
}
