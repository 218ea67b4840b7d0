//! Lua scripts for the item lifecycle.
//!
//! Item hash fields: `id`, `name`, `content_type`, `blob_path` (absent once
//! reclaimed), `expiry_ms` (absent when unbounded), `max_views` (absent when
//! unlimited), `views`, `is_active` (`1`/`0`), `is_removed` (`1`/`0`),
//! `created_ms`.

/// Create an item unless the id is taken.
///
/// KEYS\[1\] = item hash
/// KEYS\[2\] = held-blob set
/// ARGV\[1\] = id
/// ARGV\[2\] = name
/// ARGV\[3\] = content type
/// ARGV\[4\] = blob path
/// ARGV\[5\] = expiry in unix ms, or empty
/// ARGV\[6\] = max views, or empty
/// ARGV\[7\] = created at in unix ms
///
/// Returns 1 if created, 0 if the id already existed.
pub const INSERT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1],
    'id', ARGV[1],
    'name', ARGV[2],
    'content_type', ARGV[3],
    'blob_path', ARGV[4],
    'views', 0,
    'is_active', 1,
    'is_removed', 0,
    'created_ms', ARGV[7])
if ARGV[5] ~= '' then
    redis.call('HSET', KEYS[1], 'expiry_ms', ARGV[5])
end
if ARGV[6] ~= '' then
    redis.call('HSET', KEYS[1], 'max_views', ARGV[6])
end
redis.call('SADD', KEYS[2], ARGV[1])
return 1
";

/// Check and spend one view.
///
/// KEYS\[1\] = item hash
/// ARGV\[1\] = now in unix ms
///
/// Returns `{status, blob_path, expiry_ms, remaining, last}` as strings.
/// Empty strings stand for null. `last` is `1` when this view deactivated
/// the item.
pub const CONSUME: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return {'not_found', '', '', '', '0'}
end
local f = redis.call('HMGET', KEYS[1],
    'is_removed', 'is_active', 'expiry_ms', 'max_views', 'views', 'blob_path')
if f[1] == '1' then
    return {'not_found', '', '', '', '0'}
end
local now = tonumber(ARGV[1])
local max_views = f[4] and tonumber(f[4]) or nil
local views = tonumber(f[5]) or 0
if f[2] ~= '1'
    or (f[3] and tonumber(f[3]) <= now)
    or (max_views and views >= max_views) then
    return {'expired', '', '', '', '0'}
end
views = redis.call('HINCRBY', KEYS[1], 'views', 1)
local remaining = ''
local last = '0'
if max_views then
    remaining = tostring(max_views - views)
    if views == max_views then
        redis.call('HSET', KEYS[1], 'is_active', 0)
        last = '1'
    end
end
return {'ok', f[6] or '', f[3] or '', remaining, last}
";

/// Mark an item's blob as reclaimed.
///
/// KEYS\[1\] = item hash
/// KEYS\[2\] = held-blob set
/// ARGV\[1\] = id
///
/// Returns 1 if the item changed, 0 if missing or already reclaimed.
pub const MARK_REMOVED: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
local f = redis.call('HMGET', KEYS[1], 'is_removed', 'is_active', 'blob_path')
local changed = f[1] ~= '1' or f[2] == '1' or f[3]
redis.call('HDEL', KEYS[1], 'blob_path')
redis.call('HSET', KEYS[1], 'is_removed', 1, 'is_active', 0)
redis.call('SREM', KEYS[2], ARGV[1])
if changed then
    return 1
end
return 0
";

/// Deactivate an item.
///
/// KEYS\[1\] = item hash
///
/// Returns 1 if the item was active.
pub const DEACTIVATE: &str = r"
if redis.call('HGET', KEYS[1], 'is_active') == '1' then
    redis.call('HSET', KEYS[1], 'is_active', 0)
    return 1
end
return 0
";

/// Collect reclaimable items from the held-blob set.
///
/// KEYS\[1\] = held-blob set
/// ARGV\[1\] = now in unix ms
/// ARGV\[2\] = maximum number of results
/// ARGV\[3\] = item hash key prefix (the id is appended)
///
/// Returns a flat `{id, blob_path, id, blob_path, ...}` list. Ids whose hash
/// has lost its blob path are dropped from the set on the way.
pub const RECLAIMABLE: &str = r"
local now = tonumber(ARGV[1])
local limit = tonumber(ARGV[2])
local out = {}
local found = 0
for _, id in ipairs(redis.call('SMEMBERS', KEYS[1])) do
    if found >= limit then
        break
    end
    local f = redis.call('HMGET', ARGV[3] .. id,
        'blob_path', 'is_active', 'expiry_ms', 'max_views', 'views')
    if not f[1] then
        redis.call('SREM', KEYS[1], id)
    else
        local max_views = f[4] and tonumber(f[4]) or nil
        local views = tonumber(f[5]) or 0
        if f[2] ~= '1'
            or (f[3] and tonumber(f[3]) <= now)
            or (max_views and views >= max_views) then
            table.insert(out, id)
            table.insert(out, f[1])
            found = found + 1
        end
    end
end
return out
";
