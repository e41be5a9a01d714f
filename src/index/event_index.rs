use crate::core::event::LogEvent;

/// 解码后的事件索引（append-only，按解码顺序 0..N-1 寻址）
///
/// ## 契约
/// - 只追加，不重排、不原地修改。
/// - 对外只给 clone，不暴露可变别名。
#[derive(Debug, Default)]
pub struct EventIndex {
    events: Vec<LogEvent>,
}

impl EventIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&LogEvent> {
        self.events.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogEvent> {
        self.events.iter()
    }

    /// 一次性提交一轮解码的结果（解码失败的那轮不会走到这里）
    pub fn commit(&mut self, staged: Vec<LogEvent>) {
        if self.events.is_empty() {
            self.events = staged;
        } else {
            self.events.extend(staged);
        }
    }

    /// `[begin, end)`；`view` 为 filter map（None = 全量恒等映射）。
    /// `begin > end` 或 `end` 超出可寻址长度时返回 None。
    pub fn decode_range(&self, begin: usize, end: usize, view: Option<&[u64]>) -> Option<Vec<LogEvent>> {
        let len = view.map_or(self.events.len(), |v| v.len());
        if begin > end || end > len {
            return None;
        }
        match view {
            None => Some(self.events[begin..end].to_vec()),
            Some(map) => map[begin..end]
                .iter()
                .map(|&i| self.events.get(i as usize).cloned())
                .collect(),
        }
    }

    /// 在当前视图上二分查找时间戳最接近 `ts` 的事件，返回其在 EventIndex 中的位置。
    ///
    /// - 距离相等时取更靠前的；相同时间戳连续出现时取第一个。
    /// - 视图为空返回 None。
    /// - 假设时间戳按解码顺序非递减；乱序时只保证 best-effort。
    pub fn find_nearest_by_timestamp(&self, ts: i64, view: Option<&[u64]>) -> Option<usize> {
        match view {
            None => nearest_in_view(self.events.len(), ts, |i| self.events[i].timestamp),
            Some(map) => {
                let n = map.len();
                nearest_in_view(n, ts, |i| self.events[map[i] as usize].timestamp)
                    .map(|i| map[i] as usize)
            }
        }
    }
}

/// 返回视图内下标
fn nearest_in_view(n: usize, target: i64, ts_at: impl Fn(usize) -> i64) -> Option<usize> {
    if n == 0 {
        return None;
    }
    let lower_bound = |t: i64| partition_point(n, |i| ts_at(i) < t);

    let lb = lower_bound(target);
    if lb < n && ts_at(lb) == target {
        return Some(lb);
    }

    let after = (lb < n).then_some(lb);
    let before = lb.checked_sub(1);
    let pick = match (before, after) {
        (Some(b), Some(a)) => {
            if target.abs_diff(ts_at(b)) <= ts_at(a).abs_diff(target) {
                b
            } else {
                a
            }
        }
        (Some(b), None) => b,
        (None, Some(a)) => a,
        (None, None) => return None,
    };
    // 回退到相同时间戳的第一条
    Some(lower_bound(ts_at(pick)).min(pick))
}

fn partition_point(n: usize, pred: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0usize, n);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}
