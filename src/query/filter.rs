use crate::core::error::Result;
use crate::core::types::StreamType;
use crate::index::event_index::EventIndex;
use crate::query::expr::QueryExpr;
use crate::query::parser::parse_query;

/// 当前生效的过滤结果：EventIndex 位置的严格递增子序列
#[derive(Debug, Default)]
pub struct FilterState {
    levels: Option<Vec<u8>>,
    query: Option<String>,
    map: Option<Vec<u64>>,
}

impl FilterState {
    pub fn map(&self) -> Option<&[u64]> {
        self.map.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.map.is_some()
    }

    pub fn levels(&self) -> Option<&[u8]> {
        self.levels.as_deref()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// 按 level 集合与查询重新计算（全量 O(N)）。
    ///
    /// 查询先解析，解析失败时旧状态保持不变。
    pub fn apply(
        &mut self,
        index: &EventIndex,
        stream_type: StreamType,
        levels: Option<&[u8]>,
        query: Option<&str>,
    ) -> Result<()> {
        if query.is_some() && stream_type == StreamType::Unstructured {
            tracing::warn!("KV-pair query is not supported for unstructured IR streams; filter cleared");
            self.clear();
            return Ok(());
        }
        let compiled: Option<QueryExpr> = query.map(parse_query).transpose()?;

        if levels.is_none() && compiled.is_none() {
            self.clear();
            return Ok(());
        }

        let map: Vec<u64> = index
            .iter()
            .enumerate()
            .filter(|(_, ev)| levels.map_or(true, |ls| ls.contains(&ev.level.as_u8())))
            .filter(|(_, ev)| match (&compiled, ev.auto_generated(), ev.user_generated()) {
                (None, _, _) => true,
                (Some(q), Some(auto), Some(user)) => q.matches(auto, user),
                (Some(_), _, _) => false,
            })
            .map(|(i, _)| i as u64)
            .collect();

        tracing::debug!(
            "Filter applied: {} of {} events match (levels={:?}, query={:?})",
            map.len(),
            index.len(),
            levels,
            query
        );
        *self = Self {
            levels: levels.map(<[u8]>::to_vec),
            query: query.map(str::to_string),
            map: Some(map),
        };
        Ok(())
    }
}
